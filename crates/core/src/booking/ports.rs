//! Port interfaces for the appointment ledger

use async_trait::async_trait;
use bookline_domain::{ActorRole, Appointment, AppointmentStatus, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage for appointments
///
/// Rows are never deleted; every mutation is a status transition or a
/// sync-metadata update.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Insert `appointment` if and only if fewer than `capacity`
    /// capacity-holding rows overlap its padded interval
    ///
    /// The count and the insert must happen in one atomic unit: two
    /// concurrent calls for the last opening must produce exactly one
    /// success and one `SlotTaken`.
    async fn reserve(&self, appointment: &Appointment, capacity: u32) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>>;

    /// Appointments booked by a requester, newest first
    async fn list_for_requester(&self, requester_id: &str) -> Result<Vec<Appointment>>;

    /// Appointments belonging to a provider with `start_at` inside
    /// `[from, to)`, ascending
    async fn list_for_provider(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>>;

    /// Capacity-holding appointments whose padded interval intersects
    /// `[from, to)`
    async fn capacity_holders_between(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>>;

    /// Transition `id` from `expected` to `next`, guarding against
    /// concurrent status changes
    ///
    /// Fails with `NotFound` when the row is missing and
    /// `InvalidTransition` when its status is no longer `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        cancelled_by: Option<ActorRole>,
        now: DateTime<Utc>,
    ) -> Result<Appointment>;

    /// Mark every confirmed appointment whose end has passed as
    /// completed, returning how many rows changed
    async fn complete_overdue(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Record the external calendar event backing this appointment
    async fn set_external_link(
        &self,
        id: Uuid,
        external_event_id: &str,
        integration_id: Uuid,
    ) -> Result<()>;

    /// Flag or clear the orphaned marker
    async fn set_orphaned(&self, id: Uuid, orphaned: bool) -> Result<()>;

    /// Confirmed appointments linked to events on this integration
    async fn linked_to_integration(&self, integration_id: Uuid) -> Result<Vec<Appointment>>;
}
