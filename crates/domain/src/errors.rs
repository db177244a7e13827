//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Bookline
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum BooklineError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid availability rule: {0}")]
    InvalidRule(String),

    #[error("Slot taken: {0}")]
    SlotTaken(String),

    #[error("Cancellation cutoff passed: {0}")]
    PastCancellationCutoff(String),

    #[error("Outside booking window: {0}")]
    OutsideBookingWindow(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Integration degraded: {0}")]
    IntegrationDegraded(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BooklineError {
    /// Whether this error is an expected business-rule rejection rather than
    /// a fault. Rejections are surfaced verbatim to callers and logged at
    /// debug level at most.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::SlotTaken(_)
                | Self::PastCancellationCutoff(_)
                | Self::OutsideBookingWindow(_)
                | Self::InvalidTransition(_)
                | Self::InvalidRule(_)
        )
    }
}

/// Result type alias for Bookline operations
pub type Result<T> = std::result::Result<T, BooklineError>;
