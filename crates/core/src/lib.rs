//! Core business logic for Bookline.
//!
//! Pure scheduling layer - no database, HTTP, or clock access. Services in
//! this crate depend on port traits that the infra crate implements, and
//! every time-sensitive operation takes an explicit `now` so behavior is
//! deterministic under test.

pub mod availability;
pub mod booking;
pub mod identity;
pub mod lifecycle;
pub mod slots;
pub mod sync;

// Re-export commonly used items at the crate root to avoid ambiguity
pub use availability::ports::RuleRepository;
pub use availability::service::{AvailabilityService, ProviderSchedule};
pub use booking::ports::AppointmentRepository;
pub use booking::service::{BookingService, CancelRequest, ReserveRequest};
pub use identity::ports::IdentityResolver;
pub use lifecycle::service::LifecycleService;
pub use slots::generator::{
    generate_slots, resolve_effective_day, DateSpan, EffectiveDay, SlotQuery,
};
pub use slots::service::SlotService;
pub use sync::ports::{
    BusyBlockStore, CalendarEventPayload, CalendarGateway, IntegrationRepository, PushQueue,
    TokenRefresh,
};
