//! Provider availability configuration: weekly rules, date overrides, and
//! the booking policy

pub mod ports;
pub mod service;

pub use ports::RuleRepository;
pub use service::{AvailabilityService, ProviderSchedule};
