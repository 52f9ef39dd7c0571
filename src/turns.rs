//! Process-wide turn counter
//!
//! Counts successful turns across all users; every `interval`-th turn asks
//! the persona to keep its replies short.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter of completed turns
#[derive(Debug)]
pub struct TurnCounter {
    completed: AtomicU64,
    interval: u64,
}

impl TurnCounter {
    /// Create a counter firing every `interval` turns. An interval of zero is
    /// treated as one.
    #[must_use]
    pub fn new(interval: u64) -> Self {
        Self {
            completed: AtomicU64::new(0),
            interval: interval.max(1),
        }
    }

    /// Record one successful turn. Returns `true` when the reminder is due.
    pub fn record_turn(&self) -> bool {
        let count = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        count % self.interval == 0
    }

    /// Turns completed so far
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}
