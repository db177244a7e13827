//! Reservation and cancellation

pub mod ports;
pub mod service;

pub use ports::AppointmentRepository;
pub use service::{BookingService, CancelRequest, ReserveRequest};
