//! Payment transaction: one verification attempt against an order.

use chrono::{DateTime, Utc};
use common::{Currency, Money, OrderId, TenantId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::gateway_config::GatewayKind;
use crate::order::PaymentOrder;
use crate::status::{Transition, TransactionStatus};

/// Error code recorded on attempts whose signature did not match.
pub const SIGNATURE_INVALID: &str = "SIGNATURE_INVALID";

/// Error code recorded on captured payments for an order that was already paid.
pub const DUPLICATE_CAPTURE: &str = "DUPLICATE_CAPTURE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub gateway: GatewayKind,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub amount: Money,
    pub currency: Currency,
    /// Method reported by the gateway (card, upi, ...).
    pub method: Option<String>,
    pub status: TransactionStatus,
    pub signature: String,
    pub signature_verified: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Records a verification attempt.
    ///
    /// A verified attempt starts `Pending` until the gateway reports the payment
    /// state. An unverified one is `Failed` immediately and kept for audit.
    pub fn attempt(
        order: &PaymentOrder,
        gateway_order_id: impl Into<String>,
        gateway_payment_id: impl Into<String>,
        signature: impl Into<String>,
        signature_verified: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self {
            id: TransactionId::new(),
            tenant_id: order.tenant_id,
            order_id: order.id,
            gateway: order.gateway,
            gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: gateway_payment_id.into(),
            amount: order.total_amount,
            currency: order.currency,
            method: None,
            status: TransactionStatus::Pending,
            signature: signature.into(),
            signature_verified,
            error_code: None,
            error_message: None,
            gateway_response: None,
            authorized_at: None,
            captured_at: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        };
        if !signature_verified {
            tx.status = TransactionStatus::Failed;
            tx.error_code = Some(SIGNATURE_INVALID.to_string());
            tx.error_message = Some("Payment signature verification failed".to_string());
            tx.failed_at = Some(now);
        }
        tx
    }

    fn transition_to(
        &mut self,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        if matches!(
            next,
            TransactionStatus::Authorized | TransactionStatus::Captured
        ) && !self.signature_verified
        {
            return Err(DomainError::UnverifiedSignature(self.id.to_string()));
        }
        let transition = self.status.transition(next)?;
        if transition.is_changed() {
            self.status = next;
            self.updated_at = now;
        }
        Ok(transition)
    }

    pub fn mark_authorized(
        &mut self,
        method: Option<String>,
        raw_response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        let transition = self.transition_to(TransactionStatus::Authorized, now)?;
        self.method = method.or(self.method.take());
        self.gateway_response = Some(raw_response);
        self.authorized_at.get_or_insert(now);
        Ok(transition)
    }

    pub fn mark_captured(
        &mut self,
        method: Option<String>,
        raw_response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        let transition = self.transition_to(TransactionStatus::Captured, now)?;
        self.method = method.or(self.method.take());
        self.gateway_response = Some(raw_response);
        self.authorized_at.get_or_insert(now);
        self.captured_at.get_or_insert(now);
        Ok(transition)
    }

    pub fn mark_failed(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        raw_response: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        let transition = self.transition_to(TransactionStatus::Failed, now)?;
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        if raw_response.is_some() {
            self.gateway_response = raw_response;
        }
        self.failed_at.get_or_insert(now);
        Ok(transition)
    }

    /// Applies the refund total so far: the full amount makes it `Refunded`.
    pub fn apply_refunded_total(
        &mut self,
        refunded: Money,
        now: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        let next = if refunded >= self.amount {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartiallyRefunded
        };
        self.transition_to(next, now)
    }
}
