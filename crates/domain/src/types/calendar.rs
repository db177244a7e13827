//! External calendar integration types
//!
//! A `CalendarIntegration` row holds the token handles and sync health for
//! one provider's external calendar. `PushJob` rows form the outbox that
//! carries confirmed/cancelled appointments outward; `ExternalBusyBlock`s
//! flow inward per pull cycle and are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Supported external calendar vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarVendor {
    Google,
    Microsoft,
}

impl_domain_status_conversions!(CalendarVendor {
    Google => "google",
    Microsoft => "microsoft",
});

/// Sync health recorded on the integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncHealth {
    Ok,
    Degraded,
}

impl_domain_status_conversions!(SyncHealth {
    Ok => "ok",
    Degraded => "degraded",
});

/// One provider's connection to an external calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarIntegration {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub vendor: CalendarVendor,
    pub external_calendar_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub sync_health: SyncHealth,
    pub enabled: bool,
    pub consecutive_failures: u32,
    /// Backoff gate; push/pull skip the integration until this passes
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CalendarIntegration {
    /// Whether the access token needs a refresh before the next call
    ///
    /// Treats a token expiring within the next minute as stale so an
    /// in-flight request cannot outlive it.
    pub fn token_stale(&self, now: DateTime<Utc>) -> bool {
        match self.token_expires_at {
            Some(expires_at) => expires_at <= now + chrono::Duration::seconds(60),
            None => true,
        }
    }

    /// Whether the backoff gate allows sync work now
    pub fn retry_gate_open(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }
}

/// Busy interval pulled from the external calendar
///
/// Transient: lives only in the in-memory cache between pull cycles and is
/// used solely to subtract capacity during slot generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBusyBlock {
    pub integration_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExternalBusyBlock {
    /// Whether this block overlaps `[start, end)`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// Outbox operation carried by a push job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushOperation {
    Upsert,
    Delete,
}

impl_domain_status_conversions!(PushOperation {
    Upsert => "upsert",
    Delete => "delete",
});

/// Push job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    Pending,
    Sent,
    Failed,
    Dismissed,
}

impl_domain_status_conversions!(PushStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
    Dismissed => "dismissed",
});

/// Outbox row for idempotent pushes to the external calendar
///
/// The appointment id doubles as the idempotency key in the external
/// event's metadata, so a retried `upsert` can never duplicate an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushJob {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub integration_id: Uuid,
    pub operation: PushOperation,
    pub status: PushStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl PushJob {
    /// A fresh pending job for the given appointment/integration pair
    pub fn new(
        appointment_id: Uuid,
        integration_id: Uuid,
        operation: PushOperation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            appointment_id,
            integration_id,
            operation,
            status: PushStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: now,
            sent_at: None,
        }
    }
}
