//! Domain types and models

pub mod appointment;
pub mod calendar;
pub mod identity;
pub mod scheduling;

// Re-export the scheduling vocabulary for convenience
pub use appointment::{Appointment, AppointmentStatus, ContactSnapshot};
pub use calendar::{
    CalendarIntegration, CalendarVendor, ExternalBusyBlock, PushJob, PushOperation, PushStatus,
    SyncHealth,
};
pub use identity::{ActorRole, Identity};
pub use scheduling::{AvailabilityOverride, AvailabilityRule, BookingPolicy, OverrideKind, Slot};
