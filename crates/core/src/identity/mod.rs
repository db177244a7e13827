//! Identity resolution seam

pub mod ports;

pub use ports::IdentityResolver;
