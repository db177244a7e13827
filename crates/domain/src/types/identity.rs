//! Requester/provider identity types
//!
//! Identity is owned by an external service; the core only consumes the
//! resolved subject and role of a bearer token.

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Role of an authenticated actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Client,
    Provider,
}

impl_domain_status_conversions!(ActorRole {
    Client => "client",
    Provider => "provider",
});

/// Resolved identity of a request's bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub role: ActorRole,
}

impl Identity {
    /// Providers may cancel past the cutoff and mark no-shows
    pub fn is_provider(&self) -> bool {
        self.role == ActorRole::Provider
    }
}
