use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Source of "now" for the workflow and the commission window.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that can be pinned to a fixed instant. Unpinned it follows the
/// system clock.
#[derive(Debug, Default)]
pub struct MockClock {
    // unix millis, 0 = unpinned
    pinned: AtomicI64,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pinned_at(at: DateTime<Utc>) -> Self {
        let clock = Self::new();
        clock.set(at);
        clock
    }

    pub fn set(&self, at: DateTime<Utc>) {
        // Instants at or before the epoch cannot be told apart from "unpinned".
        if at.timestamp_millis() <= 0 {
            return;
        }
        self.pinned.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.pinned.store(0, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        match self.pinned.load(Ordering::SeqCst) {
            0 => Utc::now(),
            millis => DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now),
        }
    }
}
