//! Post-reservation state transitions

pub mod service;

pub use service::LifecycleService;
