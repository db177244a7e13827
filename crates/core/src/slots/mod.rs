//! Slot generation: the pure generator plus the service that feeds it

pub mod generator;
pub mod service;

pub use generator::{generate_slots, resolve_effective_day, DateSpan, EffectiveDay, SlotQuery};
pub use service::SlotService;
