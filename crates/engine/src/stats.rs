//! Reporting rollups over a tenant's orders and refunds.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{Currency, Money, TenantId};
use domain::{OrderStatus, RefundStatus};
use payment_store::{OrderQuery, PaymentStore, TimeRange};
use serde::Serialize;

use crate::Result;

/// Money totals for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CurrencyTotals {
    /// Total collected on paid orders, fees included.
    pub gross_captured: Money,
    pub convenience_fees: Money,
    /// Completed refunds issued in the period.
    pub refunded: Money,
    pub net: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentStats {
    pub total_orders: usize,
    pub paid_orders: usize,
    /// Counts by status as of now, with expiry applied.
    pub by_status: BTreeMap<OrderStatus, usize>,
    pub by_currency: BTreeMap<Currency, CurrencyTotals>,
    /// Paid orders over all orders, 0 when there are none.
    pub success_rate: f64,
}

/// Read-only rollups.
#[derive(Clone)]
pub struct StatsAggregator<S: PaymentStore> {
    store: S,
}

impl<S: PaymentStore> StatsAggregator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stats for orders created and refunds issued within `range`.
    #[tracing::instrument(skip(self))]
    pub async fn payment_stats(&self, tenant_id: TenantId, range: TimeRange) -> Result<PaymentStats> {
        let mut query = OrderQuery::new();
        query.created = range;
        let orders = self.store.list_orders(tenant_id, &query).await?;
        let refunds = self.store.list_refunds(tenant_id, range).await?;

        let now = Utc::now();
        let mut by_status = BTreeMap::new();
        let mut by_currency: BTreeMap<Currency, CurrencyTotals> = BTreeMap::new();
        let mut paid_orders = 0;
        for order in &orders {
            let status = order.effective_status(now);
            *by_status.entry(status).or_insert(0) += 1;
            if status.is_paid() {
                paid_orders += 1;
                let totals = by_currency.entry(order.currency).or_default();
                totals.gross_captured += order.total_amount;
                totals.convenience_fees += order.convenience_fee;
            }
        }
        for refund in refunds.iter().filter(|r| r.status == RefundStatus::Completed) {
            let totals = by_currency.entry(refund.currency).or_default();
            totals.refunded += refund.amount;
        }
        for totals in by_currency.values_mut() {
            totals.net = totals.gross_captured - totals.refunded;
        }

        let success_rate = if orders.is_empty() {
            0.0
        } else {
            paid_orders as f64 / orders.len() as f64
        };
        Ok(PaymentStats {
            total_orders: orders.len(),
            paid_orders,
            by_status,
            by_currency,
            success_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{GatewayKind, OrderDraft, PayerInfo, PaymentOrder, PaymentRefund, PaymentTransaction};
    use payment_store::{InMemoryPaymentStore, OrderRepository, RefundRepository, TransactionRepository};

    fn order(tenant_id: TenantId, amount: i64, fee: i64, number: &str) -> PaymentOrder {
        let now = Utc::now();
        let mut order = PaymentOrder::open(
            OrderDraft {
                tenant_id,
                gateway: GatewayKind::Razorpay,
                amount: Money::from_minor(amount),
                currency: Currency::Inr,
                purpose: "Fees".to_string(),
                description: None,
                ledger_record_id: None,
                payer: PayerInfo::default(),
                notes: serde_json::json!({}),
            },
            Money::from_minor(fee),
            number.to_string(),
            now,
            chrono::Duration::hours(1),
        )
        .unwrap();
        order
            .mark_opened(format!("order_{number}"), serde_json::json!({}), now)
            .unwrap();
        order
    }

    #[tokio::test]
    async fn rolls_up_paid_orders_and_refunds() {
        let store = InMemoryPaymentStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let mut paid = order(tenant, 1000, 20, "PAY1");
        paid.transition_to(OrderStatus::Captured, now).unwrap();
        store.insert_order(&paid).await.unwrap();
        store.insert_order(&order(tenant, 500, 10, "PAY2")).await.unwrap();
        store.insert_order(&order(TenantId::new(), 9999, 0, "PAY3")).await.unwrap();

        let mut tx = PaymentTransaction::attempt(&paid, "order_PAY1", "pay_1", "sig", true, now);
        tx.mark_captured(None, serde_json::json!({}), now).unwrap();
        store.insert_transaction(&tx).await.unwrap();
        let mut refund = PaymentRefund::request(&tx, Money::from_minor(300), "overpaid", "admin", now).unwrap();
        store.reserve_refund(&refund, tx.amount).await.unwrap();
        refund.complete("rfnd_1".to_string(), serde_json::json!({}), now).unwrap();
        store.update_refund(&refund, RefundStatus::Pending).await.unwrap();

        let stats = StatsAggregator::new(store)
            .payment_stats(tenant, TimeRange::all())
            .await
            .unwrap();
        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.paid_orders, 1);
        assert_eq!(stats.by_status.get(&OrderStatus::Pending), Some(&1));
        assert_eq!(stats.success_rate, 0.5);

        let inr = stats.by_currency[&Currency::Inr];
        assert_eq!(inr.gross_captured, Money::from_minor(1020));
        assert_eq!(inr.convenience_fees, Money::from_minor(20));
        assert_eq!(inr.refunded, Money::from_minor(300));
        assert_eq!(inr.net, Money::from_minor(720));
    }

    #[tokio::test]
    async fn empty_tenant_has_zero_rate() {
        let stats = StatsAggregator::new(InMemoryPaymentStore::new())
            .payment_stats(TenantId::new(), TimeRange::all())
            .await
            .unwrap();
        assert_eq!(stats.total_orders, 0);
        assert_eq!(stats.success_rate, 0.0);
    }
}
