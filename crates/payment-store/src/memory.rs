use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ConfigId, Money, NotificationId, OrderId, RefundId, TenantId, TransactionId};
use domain::{
    GatewayConfig, GatewayKind, OrderStatus, PaymentNotification, PaymentOrder, PaymentRefund,
    PaymentTransaction, RefundStatus, TransactionStatus,
};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError, TimeRange,
    store::{
        GatewayConfigRepository, NotificationRepository, OrderRepository, RefundRepository,
        TransactionRepository,
    },
};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, PaymentOrder>,
    transactions: HashMap<TransactionId, PaymentTransaction>,
    refunds: HashMap<RefundId, PaymentRefund>,
    notifications: Vec<PaymentNotification>,
    configs: HashMap<ConfigId, GatewayConfig>,
}

/// In-memory payment store for tests and single-process deployments.
///
/// Applies the same uniqueness and conditional-write rules as the PostgreSQL
/// implementation. All tables sit behind one lock so multi-row rules (single
/// default config, refund ceiling) hold without extra coordination.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.tables.read().await.transactions.len()
    }

    pub async fn refund_count(&self) -> usize {
        self.tables.read().await.refunds.len()
    }

    pub async fn notification_count(&self) -> usize {
        self.tables.read().await.notifications.len()
    }

    /// Clears every table.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

fn conflict(entity: &'static str, id: impl ToString, expected: &str, actual: &str) -> StoreError {
    StoreError::ConcurrencyConflict {
        entity,
        id: id.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

#[async_trait]
impl OrderRepository for InMemoryPaymentStore {
    async fn insert_order(&self, order: &PaymentOrder) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: order.id.to_string(),
            });
        }
        for existing in tables.orders.values() {
            if existing.order_number == order.order_number {
                return Err(StoreError::Duplicate {
                    entity: "order",
                    key: order.order_number.clone(),
                });
            }
            if order.gateway_order_id.is_some() && existing.gateway_order_id == order.gateway_order_id
            {
                return Err(StoreError::Duplicate {
                    entity: "order",
                    key: order.gateway_order_id.clone().unwrap_or_default(),
                });
            }
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &PaymentOrder, expected: OrderStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(gateway_order_id) = &order.gateway_order_id
            && tables.orders.values().any(|o| {
                o.id != order.id && o.gateway_order_id.as_deref() == Some(gateway_order_id.as_str())
            })
        {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: gateway_order_id.clone(),
            });
        }
        let stored = tables
            .orders
            .get_mut(&order.id)
            .filter(|o| o.tenant_id == order.tenant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order.id.to_string(),
            })?;
        if stored.status != expected {
            return Err(conflict(
                "order",
                order.id,
                expected.as_str(),
                stored.status.as_str(),
            ));
        }
        *stored = order.clone();
        Ok(())
    }

    async fn find_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Option<PaymentOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .get(&order_id)
            .filter(|o| o.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_order_by_number(
        &self,
        tenant_id: TenantId,
        order_number: &str,
    ) -> Result<Option<PaymentOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.tenant_id == tenant_id && o.order_number == order_number)
            .cloned())
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn list_orders(
        &self,
        tenant_id: TenantId,
        query: &OrderQuery,
    ) -> Result<Vec<PaymentOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| o.tenant_id == tenant_id && query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn expire_stale_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>> {
        let mut tables = self.tables.write().await;
        let mut expired = Vec::new();
        for order in tables.orders.values_mut() {
            if order.is_expired(now) {
                order.transition_to(OrderStatus::Expired, now)?;
                expired.push(order.clone());
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl TransactionRepository for InMemoryPaymentStore {
    async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.transactions.contains_key(&transaction.id) {
            return Err(StoreError::Duplicate {
                entity: "transaction",
                key: transaction.id.to_string(),
            });
        }
        tables.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn update_transaction(
        &self,
        transaction: &PaymentTransaction,
        expected: TransactionStatus,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .transactions
            .get_mut(&transaction.id)
            .filter(|t| t.tenant_id == transaction.tenant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "transaction",
                id: transaction.id.to_string(),
            })?;
        if stored.status != expected {
            return Err(conflict(
                "transaction",
                transaction.id,
                expected.as_str(),
                stored.status.as_str(),
            ));
        }
        *stored = transaction.clone();
        Ok(())
    }

    async fn find_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Option<PaymentTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .get(&transaction_id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_transaction_by_payment_id(
        &self,
        tenant_id: TenantId,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.gateway_payment_id == gateway_payment_id)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn list_transactions_for_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<PaymentTransaction>> {
        let tables = self.tables.read().await;
        let mut transactions: Vec<_> = tables
            .transactions
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.order_id == order_id)
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.created_at);
        Ok(transactions)
    }
}

#[async_trait]
impl RefundRepository for InMemoryPaymentStore {
    async fn reserve_refund(&self, refund: &PaymentRefund, ceiling: Money) -> Result<()> {
        let mut tables = self.tables.write().await;
        let held: Money = tables
            .refunds
            .values()
            .filter(|r| r.order_id == refund.order_id && r.holds_balance())
            .map(|r| r.amount)
            .sum();
        let available = ceiling - held;
        if refund.amount > available {
            return Err(StoreError::BalanceExceeded {
                transaction_id: refund.transaction_id.to_string(),
                available,
            });
        }
        tables.refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn update_refund(&self, refund: &PaymentRefund, expected: RefundStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .refunds
            .get_mut(&refund.id)
            .filter(|r| r.tenant_id == refund.tenant_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "refund",
                id: refund.id.to_string(),
            })?;
        if stored.status != expected {
            return Err(conflict(
                "refund",
                refund.id,
                expected.as_str(),
                stored.status.as_str(),
            ));
        }
        *stored = refund.clone();
        Ok(())
    }

    async fn list_refunds_for_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Vec<PaymentRefund>> {
        let tables = self.tables.read().await;
        let mut refunds: Vec<_> = tables
            .refunds
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.transaction_id == transaction_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }

    async fn list_refunds_for_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<PaymentRefund>> {
        let tables = self.tables.read().await;
        let mut refunds: Vec<_> = tables
            .refunds
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.order_id == order_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }

    async fn list_refunds(
        &self,
        tenant_id: TenantId,
        range: TimeRange,
    ) -> Result<Vec<PaymentRefund>> {
        let tables = self.tables.read().await;
        let mut refunds: Vec<_> = tables
            .refunds
            .values()
            .filter(|r| r.tenant_id == tenant_id && range.contains(r.created_at))
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryPaymentStore {
    async fn insert_notification(&self, notification: &PaymentNotification) -> Result<()> {
        let mut tables = self.tables.write().await;
        if notification.signature_valid
            && let Some(event_id) = &notification.event_id
            && tables.notifications.iter().any(|n| {
                n.signature_valid
                    && n.gateway == notification.gateway
                    && n.event_id.as_deref() == Some(event_id.as_str())
            })
        {
            return Err(StoreError::Duplicate {
                entity: "notification",
                key: event_id.clone(),
            });
        }
        tables.notifications.push(notification.clone());
        Ok(())
    }

    async fn find_notification(&self, id: NotificationId) -> Result<Option<PaymentNotification>> {
        let tables = self.tables.read().await;
        Ok(tables.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn find_notification_by_event_id(
        &self,
        gateway: GatewayKind,
        event_id: &str,
    ) -> Result<Option<PaymentNotification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .find(|n| {
                n.signature_valid && n.gateway == gateway && n.event_id.as_deref() == Some(event_id)
            })
            .cloned())
    }

    async fn list_unprocessed_notifications(
        &self,
        limit: usize,
    ) -> Result<Vec<PaymentNotification>> {
        let tables = self.tables.read().await;
        // Insertion order is arrival order.
        Ok(tables
            .notifications
            .iter()
            .filter(|n| !n.processed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_notification_processed(
        &self,
        id: NotificationId,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "notification",
                id: id.to_string(),
            })?;
        notification.mark_processed(error, at);
        Ok(())
    }
}

#[async_trait]
impl GatewayConfigRepository for InMemoryPaymentStore {
    async fn save_config(&self, config: &GatewayConfig) -> Result<GatewayConfig> {
        let mut tables = self.tables.write().await;
        let mut stored = config.clone();
        let replaced = tables
            .configs
            .values()
            .find(|c| c.tenant_id == config.tenant_id && c.gateway == config.gateway)
            .map(|c| (c.id, c.created_at));
        if let Some((id, created_at)) = replaced {
            tables.configs.remove(&id);
            stored.id = id;
            stored.created_at = created_at;
        }
        if stored.is_default {
            for other in tables
                .configs
                .values_mut()
                .filter(|c| c.tenant_id == stored.tenant_id)
            {
                other.is_default = false;
            }
        }
        tables.configs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_config(
        &self,
        tenant_id: TenantId,
        gateway: GatewayKind,
    ) -> Result<Option<GatewayConfig>> {
        let tables = self.tables.read().await;
        Ok(tables
            .configs
            .values()
            .find(|c| c.tenant_id == tenant_id && c.gateway == gateway)
            .cloned())
    }

    async fn list_configs(&self, tenant_id: TenantId) -> Result<Vec<GatewayConfig>> {
        let tables = self.tables.read().await;
        let mut configs: Vec<_> = tables
            .configs
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        configs.sort_by_key(|c| c.created_at);
        Ok(configs)
    }
}
