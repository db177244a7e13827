//! External calendar connectors
//!
//! One gateway per vendor, all behind the `CalendarGateway` port. The
//! appointment id travels as an idempotency key in the external event's
//! metadata so retried pushes update instead of duplicating.

pub mod providers;

pub use providers::{create_calendar_gateway, OauthCredentials};
