//! HTTP client for the identity service
//!
//! Bearer tokens are opaque here; the identity service owns validation.
//! The adapter POSTs the token to the introspection endpoint and maps the
//! response onto a domain `Identity`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bookline_core::IdentityResolver;
use bookline_domain::{ActorRole, BooklineError, Identity, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::InfraError;

/// Resolves bearer tokens against the identity service's introspection
/// endpoint.
pub struct HttpIdentityResolver {
    client: Client,
    introspect_url: String,
    timeout: Duration,
}

impl HttpIdentityResolver {
    pub fn new(introspect_url: impl Into<String>, timeout: Duration) -> Self {
        Self { client: Client::new(), introspect_url: introspect_url.into(), timeout }
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity> {
        let response = self
            .client
            .post(&self.introspect_url)
            .timeout(self.timeout)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(InfraError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text =
                response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(match status.as_u16() {
                401 | 403 => BooklineError::Auth(format!(
                    "identity service rejected the caller ({status})"
                )),
                _ => BooklineError::Network(format!(
                    "identity introspection failed ({status}): {error_text}"
                )),
            });
        }

        let introspection: IntrospectionResponse =
            response.json().await.map_err(|e| {
                BooklineError::Network(format!("malformed introspection response: {e}"))
            })?;

        if !introspection.active {
            return Err(BooklineError::Auth("token is not active".into()));
        }

        let subject = introspection
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BooklineError::Auth("active token carries no subject".into()))?;
        let role = introspection
            .role
            .as_deref()
            .ok_or_else(|| BooklineError::Auth("active token carries no role".into()))
            .and_then(|raw| {
                ActorRole::from_str(raw)
                    .map_err(|_| BooklineError::Auth(format!("unknown role `{raw}`")))
            })?;

        debug!(%subject, ?role, "resolved bearer token");
        Ok(Identity { subject, role })
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    sub: Option<String>,
    role: Option<String>,
}
