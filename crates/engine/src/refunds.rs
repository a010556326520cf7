//! Full and partial refunds of captured transactions.

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderId, TenantId, TransactionId};
use domain::{
    OrderStatus, PaymentRefund, PaymentTransaction, RefundStatus, TransactionStatus,
    completed_total, refundable_balance,
};
use gateway::{GatewayCredentials, GatewayRegistry};
use payment_store::{PaymentStore, StoreError};
use serde::Deserialize;

use crate::calls::gateway_call;
use crate::outcome::{Failure, RefundOutcome};
use crate::{EngineConfig, EngineError, GatewayConfigStore, Result};

/// Attempts at recomputing balances when a concurrent refund moves the rows.
const SETTLE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRefundRequest {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    /// Refund amount in minor units; the remaining refundable balance when absent.
    #[serde(default)]
    pub amount: Option<Money>,
    pub reason: String,
    pub initiated_by: String,
}

/// Issues refunds against captured transactions.
#[derive(Clone)]
pub struct RefundProcessor<S: PaymentStore> {
    store: S,
    configs: GatewayConfigStore<S>,
    registry: Arc<GatewayRegistry>,
    config: Arc<EngineConfig>,
}

impl<S: PaymentStore + Clone> RefundProcessor<S> {
    pub fn new(store: S, registry: Arc<GatewayRegistry>, config: Arc<EngineConfig>) -> Self {
        Self {
            configs: GatewayConfigStore::new(store.clone()),
            store,
            registry,
            config,
        }
    }

    /// Refunds all or part of a captured transaction.
    ///
    /// The refundable balance is shared by every transaction of the order.
    /// Balance and eligibility failures are errors and write nothing. Once
    /// the refund is reserved, a gateway failure marks it `Failed` and comes
    /// back as a failed [`RefundOutcome`]. After the gateway accepts the
    /// refund the outcome is always a success; bookkeeping failures from
    /// then on are logged for manual repair.
    #[tracing::instrument(
        skip(self, request),
        fields(tenant_id = %request.tenant_id, transaction_id = %request.transaction_id)
    )]
    pub async fn create_refund(&self, request: CreateRefundRequest) -> Result<RefundOutcome> {
        if request.reason.trim().is_empty() {
            return Err(EngineError::InvalidRequest("refund reason is required".to_string()));
        }

        let transaction = self
            .store
            .find_transaction(request.tenant_id, request.transaction_id)
            .await?
            .filter(|t| t.status.is_refundable())
            .ok_or_else(|| EngineError::TransactionNotRefundable(request.transaction_id.to_string()))?;

        let prior = self
            .store
            .list_refunds_for_order(request.tenant_id, transaction.order_id)
            .await?;
        let available = refundable_balance(&transaction, &prior);
        let amount = match request.amount {
            Some(amount) => amount,
            None if available.is_positive() => available,
            None => {
                return Err(EngineError::TransactionNotRefundable(format!(
                    "{} has no refundable balance left",
                    transaction.id
                )));
            }
        };
        if amount > available {
            return Err(EngineError::RefundExceedsBalance {
                requested: amount,
                available,
            });
        }

        let order = self
            .store
            .find_order(request.tenant_id, transaction.order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(transaction.order_id.to_string()))?;
        let config = self.configs.config_for_order(&order).await?;
        let adapter = self
            .registry
            .get(order.gateway)
            .map_err(|_| EngineError::GatewayNotConfigured(order.gateway))?;

        let mut refund = PaymentRefund::request(
            &transaction,
            amount,
            request.reason,
            request.initiated_by,
            Utc::now(),
        )?;
        match self.store.reserve_refund(&refund, transaction.amount).await {
            Ok(()) => {}
            Err(StoreError::BalanceExceeded { available, .. }) => {
                return Err(EngineError::RefundExceedsBalance {
                    requested: amount,
                    available,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let gateway_amount = (amount != transaction.amount).then_some(amount);
        let result = gateway_call(
            "refund",
            self.config.gateway_timeout,
            adapter.refund(
                &GatewayCredentials::from(&config),
                &transaction.gateway_payment_id,
                gateway_amount,
            ),
        )
        .await;

        match result {
            Ok(remote) => {
                refund.complete(remote.id, remote.raw, Utc::now())?;
                metrics::counter!("payment_refunds_total", "status" => "completed").increment(1);

                // The money has moved; only bookkeeping can fail from here.
                if let Err(e) = self.store.update_refund(&refund, RefundStatus::Pending).await {
                    tracing::error!(
                        refund_id = %refund.id,
                        gateway_refund_id = ?refund.gateway_refund_id,
                        error = %e,
                        "refund accepted by gateway but not recorded"
                    );
                } else {
                    match self.settle(request.tenant_id, transaction.id, order.id).await {
                        Ok(transaction) => tracing::info!(
                            refund_id = %refund.id,
                            amount = %refund.amount,
                            transaction_status = %transaction.status,
                            "refund completed"
                        ),
                        Err(e) => tracing::error!(
                            refund_id = %refund.id,
                            order_number = %order.order_number,
                            error = %e,
                            "refund completed but order status not updated"
                        ),
                    }
                }
                Ok(RefundOutcome {
                    success: true,
                    message: "Refund processed".to_string(),
                    refund,
                    failure: None,
                })
            }
            Err(error) => {
                refund.fail(error.to_string(), Utc::now())?;
                self.store.update_refund(&refund, RefundStatus::Pending).await?;

                metrics::counter!("payment_refunds_total", "status" => "failed").increment(1);
                tracing::warn!(refund_id = %refund.id, error = %error, "refund rejected by gateway");
                let failure = Failure::from_gateway(&error);
                Ok(RefundOutcome {
                    success: false,
                    message: failure.message.clone(),
                    refund,
                    failure: Some(failure),
                })
            }
        }
    }

    /// Recomputes transaction and order status from completed refunds.
    ///
    /// Reads fresh rows each attempt so concurrent refunds of the same
    /// order converge on the same totals.
    async fn settle(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
        order_id: OrderId,
    ) -> Result<PaymentTransaction> {
        let mut attempt = 1;
        loop {
            match self.try_settle(tenant_id, transaction_id, order_id).await {
                Err(EngineError::Store(e)) if e.is_conflict() && attempt < SETTLE_ATTEMPTS => {
                    tracing::debug!(attempt, "refund settlement raced, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_settle(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
        order_id: OrderId,
    ) -> Result<PaymentTransaction> {
        let mut transaction = self
            .store
            .find_transaction(tenant_id, transaction_id)
            .await?
            .ok_or(EngineError::TransactionNotFound(transaction_id))?;
        let refunds = self.store.list_refunds_for_order(tenant_id, order_id).await?;
        let refunded = completed_total(&transaction, &refunds);

        let now = Utc::now();
        let expected = transaction.status;
        if transaction.apply_refunded_total(refunded, now)?.is_changed() {
            self.store.update_transaction(&transaction, expected).await?;
        }

        let next = if transaction.status == TransactionStatus::Refunded {
            OrderStatus::Refunded
        } else {
            OrderStatus::PartiallyRefunded
        };
        let mut order = self
            .store
            .find_order(tenant_id, order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
        let expected = order.status;
        if order.transition_to(next, now)?.is_changed() {
            self.store.update_order(&order, expected).await?;
        }
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Currency;
    use domain::{GatewayConfig, GatewayKind, OrderDraft, PayerInfo, PaymentOrder};
    use gateway::{GatewayError, InMemoryGateway};
    use payment_store::{InMemoryPaymentStore, OrderRepository, RefundRepository, TransactionRepository};

    struct Fixture {
        store: InMemoryPaymentStore,
        gateway: InMemoryGateway,
        refunds: RefundProcessor<InMemoryPaymentStore>,
        tenant: TenantId,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryPaymentStore::new();
        let gateway = InMemoryGateway::new();
        let registry = Arc::new(GatewayRegistry::new().with(Arc::new(gateway.clone())));
        let tenant = TenantId::new();
        GatewayConfigStore::new(store.clone())
            .save_config(GatewayConfig::new(tenant, GatewayKind::Razorpay, "key", "secret"))
            .await
            .unwrap();
        Fixture {
            refunds: RefundProcessor::new(store.clone(), registry, Arc::new(EngineConfig::default())),
            store,
            gateway,
            tenant,
        }
    }

    /// Seeds a captured order and transaction of `total` minor units.
    async fn captured(f: &Fixture, total: i64) -> PaymentTransaction {
        let now = Utc::now();
        let mut order = PaymentOrder::open(
            OrderDraft {
                tenant_id: f.tenant,
                gateway: GatewayKind::Razorpay,
                amount: Money::from_minor(total),
                currency: Currency::Inr,
                purpose: "Fees".to_string(),
                description: None,
                ledger_record_id: None,
                payer: PayerInfo::default(),
                notes: serde_json::json!({}),
            },
            Money::zero(),
            format!("PAY{}", uuid::Uuid::new_v4().simple()),
            now,
            chrono::Duration::hours(24),
        )
        .unwrap();
        order.mark_opened("order_x".to_string(), serde_json::json!({}), now).unwrap();
        order.transition_to(OrderStatus::Captured, now).unwrap();
        f.store.insert_order(&order).await.unwrap();

        let payment_id = f.gateway.complete_checkout("order_x", "captured", "card");
        let mut tx = PaymentTransaction::attempt(&order, "order_x", payment_id, "sig", true, now);
        tx.mark_captured(Some("card".to_string()), serde_json::json!({}), now)
            .unwrap();
        f.store.insert_transaction(&tx).await.unwrap();
        tx
    }

    fn request(f: &Fixture, tx: &PaymentTransaction, amount: Option<i64>) -> CreateRefundRequest {
        CreateRefundRequest {
            tenant_id: f.tenant,
            transaction_id: tx.id,
            amount: amount.map(Money::from_minor),
            reason: "duplicate payment".to_string(),
            initiated_by: "bursar".to_string(),
        }
    }

    #[tokio::test]
    async fn partial_then_full_refund() {
        let f = fixture().await;
        let tx = captured(&f, 1000).await;

        let first = f.refunds.create_refund(request(&f, &tx, Some(400))).await.unwrap();
        assert!(first.success);
        let stored = f.store.find_transaction(f.tenant, tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::PartiallyRefunded);
        let order = f.store.find_order(f.tenant, tx.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyRefunded);

        let rest = f.refunds.create_refund(request(&f, &tx, None)).await.unwrap();
        assert_eq!(rest.refund.amount, Money::from_minor(600));
        let stored = f.store.find_transaction(f.tenant, tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Refunded);
        let order = f.store.find_order(f.tenant, tx.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);

        let payment_id = tx.gateway_payment_id.clone();
        assert_eq!(
            f.gateway.refunds(),
            vec![
                (payment_id.clone(), Some(Money::from_minor(400))),
                (payment_id, Some(Money::from_minor(600))),
            ]
        );
    }

    #[tokio::test]
    async fn full_refund_omits_amount() {
        let f = fixture().await;
        let tx = captured(&f, 1000).await;
        f.refunds.create_refund(request(&f, &tx, None)).await.unwrap();
        assert_eq!(f.gateway.refunds(), vec![(tx.gateway_payment_id.clone(), None)]);
    }

    #[tokio::test]
    async fn excess_refund_is_rejected_before_gateway() {
        let f = fixture().await;
        let tx = captured(&f, 1000).await;
        let err = f
            .refunds
            .create_refund(request(&f, &tx, Some(1001)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RefundExceedsBalance { .. }));
        assert_eq!(f.gateway.refund_calls(), 0);
        assert_eq!(f.store.refund_count().await, 0);
    }

    #[tokio::test]
    async fn gateway_rejection_fails_refund_only() {
        let f = fixture().await;
        let tx = captured(&f, 1000).await;
        f.gateway.fail_next_refund(GatewayError::Rejected {
            status: 400,
            code: "BAD_REQUEST_ERROR".to_string(),
            message: "refund window closed".to_string(),
        });

        let outcome = f.refunds.create_refund(request(&f, &tx, Some(100))).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.refund.status, RefundStatus::Failed);
        let stored = f.store.find_transaction(f.tenant, tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Captured);

        // A failed refund frees its share of the balance.
        let retry = f.refunds.create_refund(request(&f, &tx, None)).await.unwrap();
        assert_eq!(retry.refund.amount, Money::from_minor(1000));
    }

    #[tokio::test]
    async fn second_captured_row_shares_the_order_balance() {
        let f = fixture().await;
        let tx = captured(&f, 1000).await;
        f.refunds.create_refund(request(&f, &tx, None)).await.unwrap();

        // A second captured row on the same order.
        let mut stray = tx.clone();
        stray.id = TransactionId::new();
        f.store.insert_transaction(&stray).await.unwrap();

        assert!(matches!(
            f.refunds.create_refund(request(&f, &stray, None)).await,
            Err(EngineError::TransactionNotRefundable(_))
        ));
        assert!(matches!(
            f.refunds.create_refund(request(&f, &stray, Some(1))).await,
            Err(EngineError::RefundExceedsBalance { available, .. }) if available == Money::zero()
        ));
        assert_eq!(f.gateway.refund_calls(), 1);
        assert_eq!(f.store.refund_count().await, 1);
    }

    #[tokio::test]
    async fn gateway_success_is_reported_when_order_update_fails() {
        let f = fixture().await;
        let tx = captured(&f, 1000).await;
        let mut order = f.store.find_order(f.tenant, tx.order_id).await.unwrap().unwrap();
        order.transition_to(OrderStatus::Refunded, Utc::now()).unwrap();
        f.store.update_order(&order, OrderStatus::Captured).await.unwrap();

        // Refunded cannot move back to PartiallyRefunded, so settling fails.
        let outcome = f.refunds.create_refund(request(&f, &tx, Some(100))).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.refund.status, RefundStatus::Completed);
        assert_eq!(f.gateway.refund_calls(), 1);

        let stored = f
            .store
            .list_refunds_for_order(f.tenant, tx.order_id)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, RefundStatus::Completed);
    }

    #[tokio::test]
    async fn uncaptured_or_foreign_transaction_is_not_refundable() {
        let f = fixture().await;
        let tx = captured(&f, 1000).await;
        let mut foreign = request(&f, &tx, Some(10));
        foreign.tenant_id = TenantId::new();
        assert!(matches!(
            f.refunds.create_refund(foreign).await,
            Err(EngineError::TransactionNotRefundable(_))
        ));

        let mut missing = request(&f, &tx, Some(10));
        missing.transaction_id = TransactionId::new();
        assert!(matches!(
            f.refunds.create_refund(missing).await,
            Err(EngineError::TransactionNotRefundable(_))
        ));
    }
}
