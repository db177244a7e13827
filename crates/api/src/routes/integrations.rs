//! Calendar integration status and manual sync

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bookline_domain::{BooklineError, CalendarIntegration, SyncHealth};
use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{authenticate, require_provider, ApiError, ApiResult, SharedContext};

/// `GET /integrations/{id}`
///
/// Owner only. Tokens never serialize, so the response is safe to show
/// in a provider dashboard as-is.
pub async fn show(
    State(ctx): State<SharedContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<CalendarIntegration>> {
    let actor = authenticate(&ctx, &headers).await?;
    let integration = find_owned(&ctx, id).await?;
    require_provider(&actor, integration.provider_id)?;
    Ok(Json(integration))
}

/// `POST /integrations/{id}/sync`
///
/// Runs one out-of-band pull pass for a single integration, the same
/// code path the timer drives. A degraded integration whose backoff gate
/// is still closed answers 409 instead of hammering the vendor again.
pub async fn trigger_sync(
    State(ctx): State<SharedContext>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let actor = authenticate(&ctx, &headers).await?;
    let now = Utc::now();
    let integration = find_owned(&ctx, id).await?;
    require_provider(&actor, integration.provider_id)?;

    if integration.sync_health == SyncHealth::Degraded && !integration.retry_gate_open(now) {
        return Err(ApiError::Domain(BooklineError::IntegrationDegraded(
            "integration is backing off, retry after the gate passes".to_string(),
        )));
    }

    let busy_blocks = ctx.pull_worker.run_for_integration(id).await?;
    info!(integration_id = %id, busy_blocks, "manual sync pass finished");
    Ok((StatusCode::ACCEPTED, Json(json!({ "busy_blocks": busy_blocks }))))
}

async fn find_owned(ctx: &SharedContext, id: Uuid) -> ApiResult<CalendarIntegration> {
    ctx.integrations
        .find(id)
        .await?
        .ok_or_else(|| ApiError::Domain(BooklineError::NotFound(format!("integration {id}"))))
}
