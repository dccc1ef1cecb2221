//! Process-wide monotonic counters: subscriber ids and chat message ids.
//!
//! Both are single named state objects with an init step at hub construction
//! and no teardown beyond process exit.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Assigns a unique, monotonically increasing id to each connection.
#[derive(Debug, Default)]
pub struct SubscriberIdGenerator {
    next: AtomicU64,
}

impl SubscriberIdGenerator {
    pub fn new() -> Self {
        SubscriberIdGenerator { next: AtomicU64::new(1) }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Assigns message ids. Seeded from wall-clock seconds at process start so
/// ids climb across restarts instead of resetting to zero; a restart within
/// the same wall-clock second as a prior run can still collide with a
/// persisted history store (tracked as an open question in DESIGN.md). The
/// counter is `i64` to match the `messageID` wire field.
#[derive(Debug)]
pub struct MessageIdGenerator {
    next: AtomicI64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        MessageIdGenerator { next: AtomicI64::new(seed) }
    }

    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
