//! REST surface of the scheduling service
//!
//! Thin handlers only: authentication, payload validation, and status
//! mapping live here; every business decision is delegated to the core
//! services on the [`AppContext`].

pub mod appointments;
pub mod health;
pub mod integrations;
pub mod providers;
pub mod slots;

use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use bookline_domain::{BooklineError, Identity};
use serde_json::json;
use tracing::{debug, error};
use uuid::Uuid;

use crate::context::AppContext;

/// Shared application state handed to every handler
pub type SharedContext = Arc<AppContext>;

/// Handler result with the API error type
pub type ApiResult<T> = Result<T, ApiError>;

/// Build the application router
pub fn build_router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health::check))
        .route("/slots", get(slots::list))
        .route("/appointments", get(appointments::list).post(appointments::create))
        .route("/appointments/{id}", delete(appointments::cancel))
        .route("/appointments/{id}/confirm", post(appointments::confirm))
        .route("/appointments/{id}/no-show", post(appointments::no_show))
        .route("/providers/{id}/rules", get(providers::schedule).put(providers::replace_rules))
        .route("/providers/{id}/overrides/{date}", put(providers::upsert_override))
        .route("/integrations/{id}", get(integrations::show))
        .route("/integrations/{id}/sync", post(integrations::trigger_sync))
        .with_state(ctx)
}

/// Error leaving a handler
///
/// `Domain` carries a business or infrastructure error straight from the
/// services. `Forbidden` exists because the core reports every identity
/// mismatch as `Auth`: when the failure happens after the bearer token
/// already resolved, the caller is authenticated but not allowed, which
/// is 403 rather than 401.
#[derive(Debug)]
pub enum ApiError {
    Domain(BooklineError),
    Forbidden(String),
}

impl From<BooklineError> for ApiError {
    fn from(err: BooklineError) -> Self {
        Self::Domain(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Domain(err) => match err {
                BooklineError::InvalidInput(_) | BooklineError::InvalidRule(_) => {
                    StatusCode::BAD_REQUEST
                }
                BooklineError::Auth(_) => StatusCode::UNAUTHORIZED,
                BooklineError::PastCancellationCutoff(_) => StatusCode::FORBIDDEN,
                BooklineError::NotFound(_) => StatusCode::NOT_FOUND,
                BooklineError::SlotTaken(_)
                | BooklineError::InvalidTransition(_)
                | BooklineError::IntegrationDegraded(_) => StatusCode::CONFLICT,
                BooklineError::OutsideBookingWindow(_) => StatusCode::UNPROCESSABLE_ENTITY,
                BooklineError::Network(_) => StatusCode::BAD_GATEWAY,
                BooklineError::Database(_)
                | BooklineError::Config(_)
                | BooklineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Domain(err) => {
                if err.is_rejection() {
                    debug!(error = %err, "request rejected");
                } else if status.is_server_error() {
                    error!(error = %err, "request failed");
                } else {
                    debug!(error = %err, "request refused");
                }
                json!({ "error": err })
            }
            Self::Forbidden(message) => {
                debug!(reason = %message, "request forbidden");
                json!({ "error": { "type": "Forbidden", "message": message } })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Resolve the request's bearer token to an identity
pub(crate) async fn authenticate(ctx: &AppContext, headers: &HeaderMap) -> ApiResult<Identity> {
    let token = bearer_token(headers).ok_or_else(|| {
        ApiError::Domain(BooklineError::Auth("missing bearer token".to_string()))
    })?;
    ctx.identity.resolve(token).await.map_err(ApiError::Domain)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Require the authenticated actor to be the provider named in the path
pub(crate) fn require_provider(actor: &Identity, provider_id: Uuid) -> ApiResult<()> {
    let subject = Uuid::parse_str(&actor.subject).ok();
    if actor.is_provider() && subject == Some(provider_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("not the provider for this resource".to_string()))
    }
}

/// Remap `Auth` failures raised after authentication to `Forbidden`
pub(crate) fn ownership(err: BooklineError) -> ApiError {
    match err {
        BooklineError::Auth(message) => ApiError::Forbidden(message),
        other => ApiError::Domain(other),
    }
}
