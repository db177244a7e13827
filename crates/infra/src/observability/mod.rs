//! Counters surfaced by the health endpoint

mod metrics;

pub use metrics::{SyncMetrics, SyncMetricsSnapshot};
