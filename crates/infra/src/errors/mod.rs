//! Error conversion layer between external crates and `BooklineError`

mod conversions;

pub use conversions::InfraError;
