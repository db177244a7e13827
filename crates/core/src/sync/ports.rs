//! Seams between scheduling logic and the external calendar machinery

use async_trait::async_trait;
use bookline_domain::{
    Appointment, CalendarIntegration, ExternalBusyBlock, PushJob, Result,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A refreshed access token returned by the vendor
#[derive(Debug, Clone)]
pub struct TokenRefresh {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Vendor-neutral event body for an upsert push
///
/// `idempotency_key` is stamped into the external event's metadata so a
/// retried upsert updates the existing event instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEventPayload {
    pub idempotency_key: String,
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEventPayload {
    /// Build the outward event body for an appointment
    pub fn from_appointment(appointment: &Appointment) -> Self {
        let contact = &appointment.requester_contact;
        let description = match &contact.phone {
            Some(phone) => format!("Booked by {} ({}, {phone})", contact.name, contact.email),
            None => format!("Booked by {} ({})", contact.name, contact.email),
        };
        Self {
            idempotency_key: appointment.id.to_string(),
            summary: format!("Appointment: {}", contact.name),
            description,
            start: appointment.start_at,
            end: appointment.end_at(),
        }
    }
}

/// Outbound calls to one vendor's calendar API
///
/// Implementations receive the integration row for credentials and
/// calendar selection; they never mutate it.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Exchange the refresh token for a new access token
    async fn refresh_token(&self, integration: &CalendarIntegration) -> Result<TokenRefresh>;

    /// Busy intervals on the external calendar inside `[from, to)`
    async fn fetch_busy_blocks(
        &self,
        integration: &CalendarIntegration,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExternalBusyBlock>>;

    /// Create or update the event carrying `payload.idempotency_key`,
    /// returning the external event id
    async fn upsert_event(
        &self,
        integration: &CalendarIntegration,
        payload: &CalendarEventPayload,
    ) -> Result<String>;

    /// Delete an event; deleting an already-absent event is not an error
    async fn delete_event(
        &self,
        integration: &CalendarIntegration,
        external_event_id: &str,
    ) -> Result<()>;

    /// Whether the event still exists and is not cancelled vendor-side
    async fn event_exists(
        &self,
        integration: &CalendarIntegration,
        external_event_id: &str,
    ) -> Result<bool>;
}

/// Storage for calendar integration rows
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<CalendarIntegration>>;

    /// The enabled integration for a provider, if connected
    async fn find_enabled_for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Option<CalendarIntegration>>;

    async fn list_enabled(&self) -> Result<Vec<CalendarIntegration>>;

    async fn upsert(&self, integration: &CalendarIntegration) -> Result<()>;

    /// Store a refreshed access token
    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Reset health to `ok`, zero the failure streak, stamp
    /// `last_synced_at`
    async fn record_sync_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Mark `degraded`, bump the failure streak, and arm the retry gate
    async fn record_sync_failure(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// The push outbox
#[async_trait]
pub trait PushQueue: Send + Sync {
    async fn enqueue(&self, job: &PushJob) -> Result<()>;

    /// Jobs still awaiting delivery whose retry gate has passed, oldest
    /// first
    async fn due_jobs(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<PushJob>>;

    async fn mark_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Record a failed attempt and arm the next one
    async fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Retire a job that no longer makes sense to deliver
    async fn mark_dismissed(&self, id: Uuid, reason: &str) -> Result<()>;

    /// Jobs still waiting to be delivered
    async fn pending_count(&self) -> Result<u64>;
}

/// Process-local cache of pulled busy blocks
///
/// Contents are transient and rebuilt by every pull cycle; an empty cache
/// only means no external busy time is known yet.
pub trait BusyBlockStore: Send + Sync {
    /// Replace every block held for an integration
    fn replace_blocks(&self, provider_id: Uuid, integration_id: Uuid, blocks: Vec<ExternalBusyBlock>);

    /// All blocks known for a provider across its integrations
    fn blocks_for_provider(&self, provider_id: Uuid) -> Vec<ExternalBusyBlock>;

    /// Drop an integration's blocks entirely
    fn clear_integration(&self, integration_id: Uuid);
}
