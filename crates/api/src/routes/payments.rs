//! Payment verification, capture and refund endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, TransactionId};
use engine::{CreateRefundRequest, RefundOutcome, VerificationOutcome, VerifyPaymentRequest};
use payment_store::PaymentStore;
use serde::Deserialize;

use super::{AppState, Tenant};
use crate::error::ApiError;

/// Callback fields posted by the checkout widget.
///
/// Accepts both the generic names and the ones Razorpay's checkout emits.
#[derive(Deserialize)]
pub struct VerifyBody {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Deserialize)]
pub struct RefundBody {
    pub transaction_id: TransactionId,
    /// Minor units; the whole refundable balance when absent.
    #[serde(default)]
    pub amount: Option<i64>,
    pub reason: String,
    #[serde(default)]
    pub initiated_by: Option<String>,
}

/// POST /payments/verify
///
/// 200 when the payment is captured, 402 with the failure otherwise.
#[tracing::instrument(skip(state, body), fields(tenant_id = %tenant.0, gateway_order_id = %body.gateway_order_id))]
pub async fn verify<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Json(body): Json<VerifyBody>,
) -> Result<(StatusCode, Json<VerificationOutcome>), ApiError> {
    let outcome = state
        .engine
        .verify_payment(VerifyPaymentRequest {
            tenant_id: tenant.0,
            gateway_order_id: body.gateway_order_id,
            gateway_payment_id: body.gateway_payment_id,
            signature: body.signature,
        })
        .await?;
    Ok((payment_status(outcome.success), Json(outcome)))
}

/// POST /payments/transactions/{id}/capture
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn capture<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<VerificationOutcome>), ApiError> {
    let transaction_id: TransactionId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid transaction id: {id}")))?;
    let outcome = state
        .engine
        .capture_transaction(tenant.0, transaction_id)
        .await?;
    Ok((payment_status(outcome.success), Json(outcome)))
}

/// POST /payments/refunds
///
/// 201 when the gateway accepted the refund, 502 with the failed refund otherwise.
#[tracing::instrument(skip(state, body), fields(tenant_id = %tenant.0, transaction_id = %body.transaction_id))]
pub async fn refund<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Json(body): Json<RefundBody>,
) -> Result<(StatusCode, Json<RefundOutcome>), ApiError> {
    let outcome = state
        .engine
        .create_refund(CreateRefundRequest {
            tenant_id: tenant.0,
            transaction_id: body.transaction_id,
            amount: body.amount.map(Money::from_minor),
            reason: body.reason,
            initiated_by: body.initiated_by.unwrap_or_else(|| "api".to_string()),
        })
        .await?;
    let status = if outcome.success {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(outcome)))
}

fn payment_status(success: bool) -> StatusCode {
    if success {
        StatusCode::OK
    } else {
        StatusCode::PAYMENT_REQUIRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_body_accepts_checkout_field_names() {
        let body: VerifyBody = serde_json::from_value(serde_json::json!({
            "razorpay_order_id": "order_1",
            "razorpay_payment_id": "pay_1",
            "razorpay_signature": "abc",
        }))
        .unwrap();
        assert_eq!(body.gateway_order_id, "order_1");
        assert_eq!(body.gateway_payment_id, "pay_1");
        assert_eq!(body.signature, "abc");
    }
}
