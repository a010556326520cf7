//! Tenant payment statistics.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use engine::PaymentStats;
use payment_store::{PaymentStore, TimeRange};
use serde::Deserialize;

use super::{AppState, Tenant};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct StatsParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// GET /payments/stats?from=&to=
#[tracing::instrument(skip(state, params), fields(tenant_id = %tenant.0))]
pub async fn get<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Query(params): Query<StatsParams>,
) -> Result<Json<PaymentStats>, ApiError> {
    if let (Some(from), Some(to)) = (params.from, params.to)
        && from > to
    {
        return Err(ApiError::BadRequest("`from` must not be after `to`".to_string()));
    }
    let stats = state
        .engine
        .payment_stats(tenant.0, TimeRange::new(params.from, params.to))
        .await?;
    Ok(Json(stats))
}
