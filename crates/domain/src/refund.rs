//! Refund against a captured transaction.

use chrono::{DateTime, Utc};
use common::{Currency, Money, OrderId, RefundId, TenantId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::status::RefundStatus;
use crate::transaction::PaymentTransaction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRefund {
    pub id: RefundId,
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: Currency,
    pub reason: String,
    pub status: RefundStatus,
    pub gateway_refund_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Who asked for the refund.
    pub initiated_by: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRefund {
    /// Creates a `Pending` refund for `amount` of `transaction`.
    pub fn request(
        transaction: &PaymentTransaction,
        amount: Money,
        reason: impl Into<String>,
        initiated_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidAmount(amount.minor_units()));
        }
        Ok(Self {
            id: RefundId::new(),
            tenant_id: transaction.tenant_id,
            transaction_id: transaction.id,
            order_id: transaction.order_id,
            amount,
            currency: transaction.currency,
            reason: reason.into(),
            status: RefundStatus::Pending,
            gateway_refund_id: None,
            gateway_response: None,
            error_message: None,
            initiated_by: initiated_by.into(),
            processed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn complete(
        &mut self,
        gateway_refund_id: String,
        raw_response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.status.transition(RefundStatus::Completed)?;
        self.status = RefundStatus::Completed;
        self.gateway_refund_id = Some(gateway_refund_id);
        self.gateway_response = Some(raw_response);
        self.processed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.status.transition(RefundStatus::Failed)?;
        self.status = RefundStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = now;
        Ok(())
    }

    /// True while the refund still counts against the refundable balance.
    pub fn holds_balance(&self) -> bool {
        matches!(self.status, RefundStatus::Pending | RefundStatus::Completed)
    }
}

/// Amount of `transaction` that can still be refunded given `refunds`.
///
/// Refunds are counted per order: an order is paid by at most one captured
/// payment, so every refund against the order draws on that payment.
/// Completed and in-flight (pending) refunds both reduce the balance.
pub fn refundable_balance(transaction: &PaymentTransaction, refunds: &[PaymentRefund]) -> Money {
    let held: Money = refunds
        .iter()
        .filter(|r| r.order_id == transaction.order_id && r.holds_balance())
        .map(|r| r.amount)
        .sum();
    let remaining = transaction.amount - held;
    if remaining.is_negative() {
        Money::zero()
    } else {
        remaining
    }
}

/// Sum of completed refunds against the order `transaction` paid.
pub fn completed_total(transaction: &PaymentTransaction, refunds: &[PaymentRefund]) -> Money {
    refunds
        .iter()
        .filter(|r| r.order_id == transaction.order_id && r.status == RefundStatus::Completed)
        .map(|r| r.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway_config::GatewayKind;
    use crate::order::{OrderDraft, PayerInfo, PaymentOrder};
    use chrono::Duration;

    fn captured_transaction(amount: i64) -> PaymentTransaction {
        let order = PaymentOrder::open(
            OrderDraft {
                tenant_id: TenantId::new(),
                gateway: GatewayKind::Razorpay,
                amount: Money::from_minor(amount),
                currency: Currency::Inr,
                purpose: "Library fine".to_string(),
                description: None,
                ledger_record_id: None,
                payer: PayerInfo::default(),
                notes: serde_json::Value::Null,
            },
            Money::zero(),
            "PAY1".to_string(),
            Utc::now(),
            Duration::hours(1),
        )
        .unwrap();
        let mut tx = PaymentTransaction::attempt(&order, "order_1", "pay_1", "sig", true, Utc::now());
        tx.mark_captured(None, serde_json::json!({}), Utc::now()).unwrap();
        tx
    }

    #[test]
    fn balance_accounts_for_completed_and_pending() {
        let tx = captured_transaction(1000);
        let mut done = PaymentRefund::request(&tx, Money::from_minor(300), "dup", "admin", Utc::now())
            .unwrap();
        done.complete("rfnd_1".into(), serde_json::json!({}), Utc::now()).unwrap();
        let pending =
            PaymentRefund::request(&tx, Money::from_minor(200), "dup", "admin", Utc::now()).unwrap();
        let mut failed =
            PaymentRefund::request(&tx, Money::from_minor(400), "dup", "admin", Utc::now()).unwrap();
        failed.fail("gateway rejected", Utc::now()).unwrap();

        let refunds = vec![done, pending, failed];
        assert_eq!(refundable_balance(&tx, &refunds), Money::from_minor(500));
        assert_eq!(completed_total(&tx, &refunds), Money::from_minor(300));
    }

    #[test]
    fn balance_is_shared_by_every_attempt_on_the_order() {
        let tx = captured_transaction(1000);
        let mut retry = tx.clone();
        retry.id = TransactionId::new();

        let mut done = PaymentRefund::request(&tx, Money::from_minor(1000), "dup", "admin", Utc::now())
            .unwrap();
        done.complete("rfnd_1".into(), serde_json::json!({}), Utc::now()).unwrap();

        let refunds = vec![done];
        assert_eq!(refundable_balance(&retry, &refunds), Money::zero());
        assert_eq!(completed_total(&retry, &refunds), Money::from_minor(1000));
    }

    #[test]
    fn refund_amount_must_be_positive() {
        let tx = captured_transaction(1000);
        assert!(PaymentRefund::request(&tx, Money::zero(), "x", "admin", Utc::now()).is_err());
    }

    #[test]
    fn completed_refund_is_final() {
        let tx = captured_transaction(1000);
        let mut refund =
            PaymentRefund::request(&tx, Money::from_minor(100), "x", "admin", Utc::now()).unwrap();
        refund.complete("rfnd_1".into(), serde_json::json!({}), Utc::now()).unwrap();
        assert!(refund.fail("late", Utc::now()).is_err());
        assert!(refund.processed_at.is_some());
    }
}
