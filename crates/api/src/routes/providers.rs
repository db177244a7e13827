//! Provider availability management

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bookline_core::ProviderSchedule;
use bookline_domain::{
    AvailabilityOverride, AvailabilityRule, BookingPolicy, BooklineError, OverrideKind,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{authenticate, require_provider, ApiError, ApiResult, SharedContext};

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRules {
    pub rules: Vec<AvailabilityRule>,
    #[serde(default)]
    pub policy: Option<BookingPolicy>,
}

/// `GET /providers/{id}/rules`
///
/// Weekly rules, overrides in range (default: the next 90 days), and the
/// booking policy in one response.
pub async fn schedule(
    State(ctx): State<SharedContext>,
    Path(provider_id): Path<Uuid>,
    headers: HeaderMap,
    Query(query): Query<ScheduleQuery>,
) -> ApiResult<Json<ProviderSchedule>> {
    authenticate(&ctx, &headers).await?;
    let today = Utc::now().date_naive();
    let from = query.from.unwrap_or(today);
    let to = query.to.unwrap_or(today + Duration::days(90));
    let schedule = ctx.availability.schedule(provider_id, from, to).await?;
    Ok(Json(schedule))
}

/// `PUT /providers/{id}/rules`
///
/// Replaces the weekly rule set atomically and optionally the booking
/// policy alongside it. Partial edits are not supported: what is sent is
/// what holds afterwards.
pub async fn replace_rules(
    State(ctx): State<SharedContext>,
    Path(provider_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ReplaceRules>,
) -> ApiResult<StatusCode> {
    let actor = authenticate(&ctx, &headers).await?;
    require_provider(&actor, provider_id)?;

    ctx.availability.replace_weekly_rules(provider_id, body.rules).await?;
    if let Some(policy) = body.policy {
        if policy.provider_id != provider_id {
            return Err(ApiError::Domain(BooklineError::InvalidInput(
                "policy provider_id does not match the path".to_string(),
            )));
        }
        ctx.availability.set_policy(policy).await?;
    }

    info!(provider_id = %provider_id, "weekly rules replaced");
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /providers/{id}/overrides/{date}`
///
/// Body is the override payload: `{"kind":"closed"}` or
/// `{"kind":"window","start_time":…,"end_time":…}`.
pub async fn upsert_override(
    State(ctx): State<SharedContext>,
    Path((provider_id, date)): Path<(Uuid, NaiveDate)>,
    headers: HeaderMap,
    Json(kind): Json<OverrideKind>,
) -> ApiResult<StatusCode> {
    let actor = authenticate(&ctx, &headers).await?;
    require_provider(&actor, provider_id)?;

    ctx.availability.upsert_override(AvailabilityOverride { provider_id, date, kind }).await?;

    info!(provider_id = %provider_id, %date, "availability override stored");
    Ok(StatusCode::NO_CONTENT)
}
