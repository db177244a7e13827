//! Appointment and lifecycle status types
//!
//! Appointments are owned by the booking ledger: created by a successful
//! reservation, mutated only through state-machine transitions, never
//! deleted. Cancelled and completed rows are retained for audit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;
use crate::types::identity::ActorRole;

/// Appointment lifecycle status
///
/// `pending → confirmed → {completed, cancelled, no_show}`. `pending`
/// exists only for flows requiring external confirmation; the minimal
/// reserve flow goes straight to `confirmed`. Terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl_domain_status_conversions!(AppointmentStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

impl AppointmentStatus {
    /// Terminal states admit no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Whether an appointment in this status occupies slot capacity
    ///
    /// `pending` holds capacity identically to `confirmed`; otherwise a
    /// later confirm could violate the overlap invariant.
    pub fn holds_capacity(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Legal transition matrix
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Completed | Self::Cancelled | Self::NoShow)
        )
    }
}

/// Requester contact details captured at reserve time
///
/// A snapshot, deliberately not a foreign key: later CRM edits must not
/// rewrite what the provider saw when the booking was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A reserved (or historical) appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub requester_id: String,
    pub requester_contact: ContactSnapshot,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Copied from the covering rule at reserve time; rule edits do not
    /// retroactively change the padding of existing rows
    pub buffer_minutes: u32,
    pub status: AppointmentStatus,
    /// Sub-state of `confirmed`: the backing external calendar event has
    /// vanished and the provider should resolve manually
    pub orphaned: bool,
    pub external_event_id: Option<String>,
    pub integration_id: Option<Uuid>,
    pub cancelled_by: Option<ActorRole>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// End of the appointment itself
    pub fn end_at(&self) -> DateTime<Utc> {
        self.start_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// End of the appointment plus its buffer; capacity checks use this
    pub fn padded_end_at(&self) -> DateTime<Utc> {
        self.end_at() + Duration::minutes(i64::from(self.buffer_minutes))
    }

    /// Whether the padded interval overlaps `[start, end)`
    pub fn overlaps_padded(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_at < end && start < self.padded_end_at()
    }
}
