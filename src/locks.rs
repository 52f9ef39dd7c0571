//! Per-user turn locks
//!
//! A turn holds its user's guard across load, inference and save so two
//! messages from the same user can never interleave their read-modify-write.

use crate::config::{USER_LOCK_IDLE_SECS, USER_LOCK_MAX_ENTRIES};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed lock map backed by a moka cache with idle expiry
#[derive(Clone)]
pub struct UserLocks {
    locks: Cache<i64, Arc<Mutex<()>>>,
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new(USER_LOCK_MAX_ENTRIES, Duration::from_secs(USER_LOCK_IDLE_SECS))
    }
}

impl UserLocks {
    /// Create a lock map holding at most `max_capacity` idle locks
    #[must_use]
    pub fn new(max_capacity: u64, idle: Duration) -> Self {
        Self {
            locks: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(idle)
                .build(),
        }
    }

    /// Wait for and take the user's turn lock
    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .get_with(user_id, async { Arc::new(Mutex::new(())) })
            .await;
        lock.lock_owned().await
    }
}
