use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

/// Background sync metrics for monitoring
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub pushes_sent: AtomicU64,
    pub push_failures: AtomicU64,
    pub jobs_dismissed: AtomicU64,
    pub pull_cycles: AtomicU64,
    pub pull_failures: AtomicU64,
    pub busy_blocks_cached: AtomicU64,
    pub orphans_flagged: AtomicU64,
    pub appointments_completed: AtomicU64,
}

impl SyncMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a push job delivered to the vendor
    pub fn record_push_sent(&self) {
        self.pushes_sent.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a failed push attempt
    pub fn record_push_failure(&self) {
        self.push_failures.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a push job retired without delivery
    pub fn record_dismissal(&self) {
        self.jobs_dismissed.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record one completed pull cycle
    pub fn record_pull_cycle(&self) {
        self.pull_cycles.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Record a pull that failed for one integration
    pub fn record_pull_failure(&self) {
        self.pull_failures.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Update the busy-block gauge after a pull cycle
    pub fn set_busy_blocks_cached(&self, count: u64) {
        self.busy_blocks_cached.store(count, AtomicOrdering::Relaxed);
    }

    /// Record appointments flagged as orphaned this cycle
    pub fn record_orphans_flagged(&self, count: u64) {
        self.orphans_flagged.fetch_add(count, AtomicOrdering::Relaxed);
    }

    /// Record appointments swept to `completed`
    pub fn record_appointments_completed(&self, count: u64) {
        self.appointments_completed.fetch_add(count, AtomicOrdering::Relaxed);
    }

    /// Get a snapshot of metrics
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            pushes_sent: self.pushes_sent.load(AtomicOrdering::Relaxed),
            push_failures: self.push_failures.load(AtomicOrdering::Relaxed),
            jobs_dismissed: self.jobs_dismissed.load(AtomicOrdering::Relaxed),
            pull_cycles: self.pull_cycles.load(AtomicOrdering::Relaxed),
            pull_failures: self.pull_failures.load(AtomicOrdering::Relaxed),
            busy_blocks_cached: self.busy_blocks_cached.load(AtomicOrdering::Relaxed),
            orphans_flagged: self.orphans_flagged.load(AtomicOrdering::Relaxed),
            appointments_completed: self.appointments_completed.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Immutable metrics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetricsSnapshot {
    pub pushes_sent: u64,
    pub push_failures: u64,
    pub jobs_dismissed: u64,
    pub pull_cycles: u64,
    pub pull_failures: u64,
    pub busy_blocks_cached: u64,
    pub orphans_flagged: u64,
    pub appointments_completed: u64,
}
