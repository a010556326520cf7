//! Inbound gateway webhooks.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use domain::GatewayKind;
use engine::WebhookAck;
use payment_store::PaymentStore;

use super::AppState;
use crate::error::ApiError;

/// POST /payments/webhooks/{gateway}
///
/// Unauthenticated. Every delivery is stored, so the gateway gets a 200 even
/// when the signature is wrong; only storage failures surface as errors.
#[tracing::instrument(skip(state, headers, body), fields(body_len = body.len()))]
pub async fn receive<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let gateway: GatewayKind = gateway
        .parse()
        .map_err(|_| ApiError::NotFound(format!("Unknown gateway: {gateway}")))?;
    let headers = header_map(&headers);
    let ack = state.engine.handle_webhook(gateway, &body, &headers).await?;
    Ok(Json(ack))
}

/// Header names come out of `http` lowercased; non-UTF-8 values are skipped.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
