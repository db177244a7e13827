//! Background synchronization with external calendars
//!
//! Two independent flows. The push worker drains the outbox of pending
//! `PushJob`s and mirrors confirmed/cancelled appointments outward; the
//! pull worker fetches external busy blocks into the in-memory cache and
//! flags appointments whose external event vanished. Both flows are
//! idempotent and survive restarts through the persisted queue and the
//! per-integration retry gates.

mod pull;
mod push_worker;

pub use pull::{PullCycleStats, PullWorker, PullWorkerConfig};
pub use push_worker::{PushWorker, PushWorkerConfig};

use std::sync::Arc;

use bookline_core::CalendarGateway;
use bookline_domain::CalendarVendor;
use rand::Rng;

/// One gateway per supported vendor
///
/// Lookup is infallible; the composition root constructs every vendor up
/// front even when its credentials are absent (calls then fail with
/// `Auth` at refresh time).
#[derive(Clone)]
pub struct GatewaySet {
    google: Arc<dyn CalendarGateway>,
    microsoft: Arc<dyn CalendarGateway>,
}

impl GatewaySet {
    pub fn new(google: Arc<dyn CalendarGateway>, microsoft: Arc<dyn CalendarGateway>) -> Self {
        Self { google, microsoft }
    }

    pub fn for_vendor(&self, vendor: CalendarVendor) -> &Arc<dyn CalendarGateway> {
        match vendor {
            CalendarVendor::Google => &self.google,
            CalendarVendor::Microsoft => &self.microsoft,
        }
    }
}

/// Exponential backoff with jitter for sync retries
///
/// Base 1s doubling per attempt, capped at 32s, with a ±25% spread so
/// retries from parallel integrations do not land on the same instant.
pub(crate) fn calculate_backoff(attempt: u32) -> chrono::Duration {
    const BASE_MS: u64 = 1_000;
    const CAP_SHIFT: u32 = 5;

    let capped_ms = BASE_MS << attempt.min(CAP_SHIFT);
    let jitter_range = capped_ms / 4;
    let jittered_ms =
        capped_ms - jitter_range + rand::thread_rng().gen_range(0..=jitter_range * 2);

    chrono::Duration::milliseconds(jittered_ms as i64)
}

pub(crate) fn truncate_reason(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }

    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}
