//! Health endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use super::SharedContext;

/// `GET /health`
///
/// Probes the database and reports worker liveness. Degraded deployments
/// answer 503 so load balancers can rotate the instance out.
pub async fn check(State(ctx): State<SharedContext>) -> impl IntoResponse {
    let status = ctx.health_check().await;
    let code =
        if status.is_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(status))
}
