//! Appointment booking and lifecycle endpoints

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bookline_core::{CancelRequest, ReserveRequest};
use bookline_domain::{Appointment, BooklineError, ContactSnapshot};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{authenticate, ownership, ApiError, ApiResult, SharedContext};
use crate::utils::redact::contact_digest;

// Format check only; deliverability is the identity service's problem.
#[allow(clippy::expect_used)]
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("EMAIL_REGEX should compile - this is a bug")
});

#[derive(Debug, Deserialize)]
pub struct CreateAppointment {
    pub provider_id: Uuid,
    pub slot_start: DateTime<Utc>,
    pub contact: ContactSnapshot,
    /// Hold the slot as `pending` instead of booking it outright; the
    /// hold stays invisible to the calendar push until confirmed
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// `GET /appointments?from&to`
///
/// Scoped by the bearer identity: providers see their calendar in range,
/// clients see their own bookings.
pub async fn list(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Appointment>>> {
    let actor = authenticate(&ctx, &headers).await?;
    let now = Utc::now();
    let from = query.from.unwrap_or(now - Duration::days(30));
    let to = query.to.unwrap_or(now + Duration::days(90));
    let appointments = ctx.booking.list_for_actor(&actor, from, to).await?;
    Ok(Json(appointments))
}

/// `POST /appointments`
pub async fn create(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
    Json(body): Json<CreateAppointment>,
) -> ApiResult<(StatusCode, Json<Appointment>)> {
    let actor = authenticate(&ctx, &headers).await?;
    validate_contact(&body.contact)?;

    let email_digest = contact_digest(&body.contact.email);
    let request = ReserveRequest {
        provider_id: body.provider_id,
        start_at: body.slot_start,
        requester: actor,
        contact: body.contact,
        pending: body.pending,
    };
    let appointment = ctx.booking.reserve(request, Utc::now()).await?;

    info!(
        appointment_id = %appointment.id,
        provider_id = %appointment.provider_id,
        contact = %email_digest,
        "appointment reserved"
    );
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// `POST /appointments/{id}/confirm`
pub async fn confirm(
    State(ctx): State<SharedContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Appointment>> {
    let actor = authenticate(&ctx, &headers).await?;
    let appointment = ctx.lifecycle.confirm(id, &actor, Utc::now()).await.map_err(ownership)?;
    Ok(Json(appointment))
}

/// `POST /appointments/{id}/no-show` (provider only, after the end time)
pub async fn no_show(
    State(ctx): State<SharedContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Appointment>> {
    let actor = authenticate(&ctx, &headers).await?;
    let appointment =
        ctx.lifecycle.mark_no_show(id, &actor, Utc::now()).await.map_err(ownership)?;
    Ok(Json(appointment))
}

/// `DELETE /appointments/{id}`
///
/// Requester cancellations respect the policy cutoff; the provider may
/// cancel at any time.
pub async fn cancel(
    State(ctx): State<SharedContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Appointment>> {
    let actor = authenticate(&ctx, &headers).await?;
    let request = CancelRequest { appointment_id: id, actor };
    let appointment = ctx.booking.cancel(request, Utc::now()).await.map_err(ownership)?;
    Ok(Json(appointment))
}

fn validate_contact(contact: &ContactSnapshot) -> ApiResult<()> {
    if contact.name.trim().is_empty() {
        return Err(ApiError::Domain(BooklineError::InvalidInput(
            "contact name must not be empty".to_string(),
        )));
    }
    if !EMAIL_REGEX.is_match(contact.email.trim()) {
        return Err(ApiError::Domain(BooklineError::InvalidInput(
            "contact email is not a valid address".to_string(),
        )));
    }
    Ok(())
}
