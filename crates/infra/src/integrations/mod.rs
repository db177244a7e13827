//! Clients for external services

pub mod calendar;
pub mod identity;
