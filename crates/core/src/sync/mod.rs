//! Port interfaces for external calendar sync
//!
//! The workers that drive these ports live in the infra crate; core only
//! defines the seams so booking and lifecycle can enqueue push work.

pub(crate) mod outbox;
pub mod ports;

pub use ports::{
    BusyBlockStore, CalendarEventPayload, CalendarGateway, IntegrationRepository, PushQueue,
    TokenRefresh,
};
