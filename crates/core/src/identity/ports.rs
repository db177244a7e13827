//! Port interface to the external identity service

use async_trait::async_trait;
use bookline_domain::{Identity, Result};

/// Resolves a bearer token to the acting subject and role
///
/// Identity management itself is out of scope; the scheduling core only
/// needs to know who is acting and whether they are the provider.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Fails with `Auth` when the token is invalid or expired
    async fn resolve(&self, token: &str) -> Result<Identity>;
}
