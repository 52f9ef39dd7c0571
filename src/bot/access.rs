//! Allow-list checks with a cooldown on "Access denied" replies
//!
//! Unauthorized users get at most one denial notice per cooldown period so a
//! flood of messages cannot get the bot rate limited by Telegram.

use crate::config::{Settings, ACCESS_DENIED_CACHE_MAX_ENTRIES, ACCESS_DENIED_COOLDOWN_SECS};
use moka::future::Cache;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Who may chat, and who was told recently that they may not
pub struct AccessGate {
    allowed: HashSet<i64>,
    notified: Cache<i64, ()>,
    silenced: AtomicU64,
}

impl AccessGate {
    /// Create a gate. An empty `allowed` set admits everyone.
    #[must_use]
    pub fn new(allowed: HashSet<i64>, cooldown: Duration, max_capacity: u64) -> Self {
        Self {
            allowed,
            notified: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(cooldown)
                .build(),
            silenced: AtomicU64::new(0),
        }
    }

    /// Gate built from `ALLOWED_USERS`
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.allowed_users(),
            Duration::from_secs(ACCESS_DENIED_COOLDOWN_SECS),
            ACCESS_DENIED_CACHE_MAX_ENTRIES,
        )
    }

    /// Whether no allow-list is configured
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Whether `user_id` may chat
    #[must_use]
    pub fn allows(&self, user_id: i64) -> bool {
        self.is_open() || self.allowed.contains(&user_id)
    }

    /// Whether a denial notice should go out now. Starts the cooldown when it
    /// returns `true`.
    pub async fn should_notify(&self, user_id: i64) -> bool {
        let entry = self.notified.entry(user_id).or_insert(()).await;
        if entry.is_fresh() {
            return true;
        }

        let count = self.silenced.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 100 == 0 {
            debug!("Silenced {count} unauthorized attempts (recent: user {user_id})");
        }
        false
    }

    /// Denial notices suppressed so far
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced.load(Ordering::Relaxed)
    }
}
