//! Open-slot discovery

use axum::extract::{Query, State};
use axum::Json;
use bookline_core::DateSpan;
use bookline_domain::Slot;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResult, SharedContext};

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub provider: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// `GET /slots?provider&from&to`
///
/// Unauthenticated on purpose: booking pages browse availability before
/// the requester signs in. Only derived start times leave the service,
/// never who holds the conflicting bookings.
pub async fn list(
    State(ctx): State<SharedContext>,
    Query(query): Query<SlotsQuery>,
) -> ApiResult<Json<Vec<Slot>>> {
    let span = DateSpan::new(query.from, query.to);
    let slots = ctx.slots.open_slots(query.provider, span, Utc::now()).await?;
    Ok(Json(slots))
}
