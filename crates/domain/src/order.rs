//! Payment order: one intent to collect money.

use chrono::{DateTime, Duration, Utc};
use common::{Currency, Money, OrderId, TenantId};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::gateway_config::GatewayKind;
use crate::status::{OrderStatus, Transition};

/// Length of the random suffix appended to order numbers.
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;

/// Who is paying.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayerInfo {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Internal user id when the payer has an account.
    pub user_id: Option<Uuid>,
}

/// Everything the caller decides about a new order.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub tenant_id: TenantId,
    pub gateway: GatewayKind,
    pub amount: Money,
    pub currency: Currency,
    pub purpose: String,
    pub description: Option<String>,
    /// External fee-ledger record to mark paid on capture.
    pub ledger_record_id: Option<String>,
    pub payer: PayerInfo,
    pub notes: serde_json::Value,
}

/// A payment order.
///
/// `total_amount == amount + convenience_fee` holds for every order built by
/// [`PaymentOrder::open`]. Orders are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub id: OrderId,
    pub tenant_id: TenantId,
    /// Human-readable unique number, also the gateway receipt reference.
    pub order_number: String,
    pub gateway: GatewayKind,
    pub gateway_order_id: Option<String>,
    pub amount: Money,
    pub currency: Currency,
    pub convenience_fee: Money,
    pub total_amount: Money,
    pub purpose: String,
    pub description: Option<String>,
    pub ledger_record_id: Option<String>,
    pub payer: PayerInfo,
    pub status: OrderStatus,
    pub expires_at: DateTime<Utc>,
    pub notes: serde_json::Value,
    pub receipt_url: Option<String>,
    /// Raw provider payload from remote order creation, kept for audit only.
    pub gateway_response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentOrder {
    /// Builds a new order in `Created` status.
    pub fn open(
        draft: OrderDraft,
        convenience_fee: Money,
        order_number: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, DomainError> {
        if !draft.amount.is_positive() {
            return Err(DomainError::InvalidAmount(draft.amount.minor_units()));
        }
        if convenience_fee.is_negative() {
            return Err(DomainError::InvalidAmount(convenience_fee.minor_units()));
        }
        let total_amount = draft
            .amount
            .checked_add(convenience_fee)
            .ok_or(DomainError::InvalidAmount(draft.amount.minor_units()))?;

        Ok(Self {
            id: OrderId::new(),
            tenant_id: draft.tenant_id,
            order_number,
            gateway: draft.gateway,
            gateway_order_id: None,
            amount: draft.amount,
            currency: draft.currency,
            convenience_fee,
            total_amount,
            purpose: draft.purpose,
            description: draft.description,
            ledger_record_id: draft.ledger_record_id,
            payer: draft.payer,
            status: OrderStatus::Created,
            expires_at: now + ttl,
            notes: draft.notes,
            receipt_url: None,
            gateway_response: None,
            error_message: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// True once `expires_at` has passed while the order is still unpaid,
    /// whether or not the stored status has caught up.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_expirable() && self.expires_at <= now
    }

    /// Status as it should be reported at `now`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> OrderStatus {
        if self.is_expired(now) {
            OrderStatus::Expired
        } else {
            self.status
        }
    }

    /// Moves the order to `next`, rejecting regressions.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, DomainError> {
        let transition = self.status.transition(next)?;
        if transition.is_changed() {
            self.status = next;
            self.updated_at = now;
            if next == OrderStatus::Captured {
                self.paid_at = Some(now);
            }
        }
        Ok(transition)
    }

    /// Records a successfully opened remote order and moves to `Pending`.
    pub fn mark_opened(
        &mut self,
        gateway_order_id: String,
        raw_response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_to(OrderStatus::Pending, now)?;
        self.gateway_order_id = Some(gateway_order_id);
        self.gateway_response = Some(raw_response);
        Ok(())
    }

    /// Records a failed remote order creation and moves to `Failed`.
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        raw_response: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_to(OrderStatus::Failed, now)?;
        self.error_message = Some(error.into());
        if raw_response.is_some() {
            self.gateway_response = raw_response;
        }
        Ok(())
    }
}

/// Generates an order number: prefix + UTC timestamp + random suffix.
///
/// Collisions are possible but negligible; storage rejects duplicates and the
/// caller retries with a fresh number.
pub fn generate_order_number(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ORDER_NUMBER_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{prefix}{}{suffix}", now.format("%Y%m%d%H%M%S"))
}
