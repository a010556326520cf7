//! Structured results of engine operations.
//!
//! Each carries the durable record it produced so callers can show or audit
//! it, plus a [`Failure`] when the business outcome was negative.

use common::NotificationId;
use domain::{OrderStatus, PaymentOrder, PaymentRefund, PaymentTransaction};
use gateway::GatewayError;
use serde::Serialize;

use crate::CheckoutOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The checkout signature did not match.
    SignatureInvalid,
    /// The gateway could not be reached or timed out. Safe to retry.
    GatewayNetworkError,
    /// The gateway gave a definitive error. Needs review before retrying.
    GatewayRejected,
    /// The gateway reports the payment as authorized or failed, not captured.
    PaymentNotCaptured,
    /// The gateway payment does not belong to this order or amount.
    PaymentMismatch,
    /// The order was already paid by a different payment.
    DuplicatePayment,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SignatureInvalid => "signature_invalid",
            FailureKind::GatewayNetworkError => "gateway_network_error",
            FailureKind::GatewayRejected => "gateway_rejected",
            FailureKind::PaymentNotCaptured => "payment_not_captured",
            FailureKind::PaymentMismatch => "payment_mismatch",
            FailureKind::DuplicatePayment => "duplicate_payment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub code: Option<String>,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Classifies a gateway error as transient or definitive.
    pub fn from_gateway(error: &GatewayError) -> Self {
        let kind = if error.is_transient() {
            FailureKind::GatewayNetworkError
        } else {
            FailureKind::GatewayRejected
        };
        Self::new(kind, Some(error.code()), error.to_string())
    }
}

/// Result of creating an order. The order row exists either way.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCreation {
    pub order: PaymentOrder,
    /// Present when the remote order was opened.
    pub checkout: Option<CheckoutOptions>,
    pub failure: Option<Failure>,
}

impl OrderCreation {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of verifying (or capturing) a payment.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    /// True only when the payment is captured.
    pub success: bool,
    pub message: String,
    pub transaction: PaymentTransaction,
    pub order_status: OrderStatus,
    pub failure: Option<Failure>,
}

/// Result of a refund request that reached the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub success: bool,
    pub message: String,
    pub refund: PaymentRefund,
    pub failure: Option<Failure>,
}

/// Acknowledgement for a webhook delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub notification_id: NotificationId,
    pub signature_valid: bool,
    /// The provider already delivered this event.
    pub duplicate: bool,
}
