//! # Bookline API
//!
//! HTTP service layer - REST surface and composition root.
//!
//! This crate contains:
//! - The axum router and handlers for the scheduling API
//! - Application context (dependency injection)
//! - Main entry point and startup wiring
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture
//! - Everything user-facing speaks JSON over HTTP

pub mod context;
pub mod routes;
pub mod utils;

// Re-export for convenience
pub use context::AppContext;
pub use routes::build_router;
