//! Lock-free counters shared between the capture thread, the decode
//! worker, and the terminal dashboard's 1 Hz sampler.

use std::sync::atomic::AtomicU64;

#[derive(Debug, Default)]
pub struct Stats {
    pub bytes_received: AtomicU64,
    pub messages_processed: AtomicU64,
    pub parse_errors: AtomicU64,
}

/// A point-in-time snapshot, cheap to clone for display purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub bytes_received: u64,
    pub messages_processed: u64,
    pub parse_errors: u64,
    pub subscriber_count: usize,
}

impl Stats {
    pub fn snapshot(&self, subscriber_count: usize) -> StatsSnapshot {
        use std::sync::atomic::Ordering::Relaxed;
        StatsSnapshot {
            bytes_received: self.bytes_received.load(Relaxed),
            messages_processed: self.messages_processed.load(Relaxed),
            parse_errors: self.parse_errors.load(Relaxed),
            subscriber_count,
        }
    }
}
