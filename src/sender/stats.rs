// Lock-free shipper counters.
//
// Updated from emitting threads and the delivery loop; read through snapshots.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ShipperStats {
    enqueued: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_shutdown: AtomicU64,
    dropped_pending_overflow: AtomicU64,
    batches_dropped_pending: AtomicU64,
    batches_delivered: AtomicU64,
    events_delivered: AtomicU64,
    batches_failed_permanent: AtomicU64,
    batches_failed_exhausted: AtomicU64,
    events_failed: AtomicU64,
    retry_attempts: AtomicU64,
}

impl ShipperStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_overflow(&self) {
        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_shutdown(&self, events: u64) {
        self.dropped_shutdown.fetch_add(events, Ordering::Relaxed);
    }

    /// A closed batch was evicted from the pending queue.
    pub fn record_pending_eviction(&self, events: u64) {
        self.batches_dropped_pending.fetch_add(1, Ordering::Relaxed);
        self.dropped_pending_overflow
            .fetch_add(events, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, events: u64) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.events_delivered.fetch_add(events, Ordering::Relaxed);
    }

    pub fn record_failed_permanent(&self, events: u64) {
        self.batches_failed_permanent.fetch_add(1, Ordering::Relaxed);
        self.events_failed.fetch_add(events, Ordering::Relaxed);
    }

    pub fn record_failed_exhausted(&self, events: u64) {
        self.batches_failed_exhausted.fetch_add(1, Ordering::Relaxed);
        self.events_failed.fetch_add(events, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ShipperStatsSnapshot {
        ShipperStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::Relaxed),
            dropped_pending_overflow: self.dropped_pending_overflow.load(Ordering::Relaxed),
            batches_dropped_pending: self.batches_dropped_pending.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            batches_failed_permanent: self.batches_failed_permanent.load(Ordering::Relaxed),
            batches_failed_exhausted: self.batches_failed_exhausted.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ShipperStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipperStatsSnapshot {
    pub enqueued: u64,
    pub dropped_overflow: u64,
    pub dropped_shutdown: u64,
    /// Events lost to pending-batch eviction.
    pub dropped_pending_overflow: u64,
    pub batches_dropped_pending: u64,
    pub batches_delivered: u64,
    pub events_delivered: u64,
    pub batches_failed_permanent: u64,
    pub batches_failed_exhausted: u64,
    pub events_failed: u64,
    pub retry_attempts: u64,
}

impl ShipperStatsSnapshot {
    /// Every event that was accepted or rejected and will never be delivered.
    pub fn total_dropped(&self) -> u64 {
        self.dropped_overflow
            + self.dropped_shutdown
            + self.dropped_pending_overflow
            + self.events_failed
    }

    pub fn success_rate(&self) -> f64 {
        let finished = self.batches_delivered
            + self.batches_failed_permanent
            + self.batches_failed_exhausted;
        if finished == 0 {
            return 1.0;
        }
        self.batches_delivered as f64 / finished as f64
    }
}
