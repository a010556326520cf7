use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, NotificationId, OrderId, TenantId, TransactionId};
use domain::{
    GatewayConfig, GatewayKind, OrderStatus, PaymentNotification, PaymentOrder, PaymentRefund,
    PaymentTransaction, RefundStatus, TransactionStatus,
};

use crate::{OrderQuery, Result, TimeRange};

/// Storage for payment orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order.
    ///
    /// Fails with `Duplicate` if the order number or remote order id is taken.
    async fn insert_order(&self, order: &PaymentOrder) -> Result<()>;

    /// Overwrites an order, provided its stored status is still `expected`.
    ///
    /// Fails with `ConcurrencyConflict` when another writer moved the status
    /// first, and with `NotFound` when the order does not exist for its tenant.
    async fn update_order(&self, order: &PaymentOrder, expected: OrderStatus) -> Result<()>;

    async fn find_order(&self, tenant_id: TenantId, order_id: OrderId)
    -> Result<Option<PaymentOrder>>;

    async fn find_order_by_number(
        &self,
        tenant_id: TenantId,
        order_number: &str,
    ) -> Result<Option<PaymentOrder>>;

    /// Looks an order up by the provider's order id across all tenants.
    ///
    /// Callers must check `tenant_id` on the result before trusting it.
    async fn find_by_gateway_order_id(&self, gateway_order_id: &str)
    -> Result<Option<PaymentOrder>>;

    /// Lists a tenant's orders matching `query`, newest first.
    async fn list_orders(&self, tenant_id: TenantId, query: &OrderQuery)
    -> Result<Vec<PaymentOrder>>;

    /// Moves every `Created`/`Pending` order whose expiry has passed to
    /// `Expired` and returns the orders it changed.
    ///
    /// Safe to run concurrently: each row is only changed while still expirable.
    async fn expire_stale_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>>;
}

/// Storage for verification attempts.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<()>;

    /// Overwrites a transaction, provided its stored status is still `expected`.
    async fn update_transaction(
        &self,
        transaction: &PaymentTransaction,
        expected: TransactionStatus,
    ) -> Result<()>;

    async fn find_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Option<PaymentTransaction>>;

    /// Most recent attempt carrying the provider's payment id.
    async fn find_transaction_by_payment_id(
        &self,
        tenant_id: TenantId,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentTransaction>>;

    /// Attempts against an order, oldest first.
    async fn list_transactions_for_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<PaymentTransaction>>;
}

/// Storage for refunds.
#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Inserts a pending refund if it fits within `ceiling`.
    ///
    /// The check and the insert are atomic with respect to other refunds of
    /// the same order: pending and completed refunds of the order plus this
    /// one must not exceed `ceiling`, otherwise `BalanceExceeded` is returned
    /// and nothing is written.
    async fn reserve_refund(&self, refund: &PaymentRefund, ceiling: Money) -> Result<()>;

    /// Overwrites a refund, provided its stored status is still `expected`.
    async fn update_refund(&self, refund: &PaymentRefund, expected: RefundStatus) -> Result<()>;

    /// Refunds against a transaction, oldest first.
    async fn list_refunds_for_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Vec<PaymentRefund>>;

    async fn list_refunds_for_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<PaymentRefund>>;

    /// Refunds created within `range`.
    async fn list_refunds(&self, tenant_id: TenantId, range: TimeRange)
    -> Result<Vec<PaymentRefund>>;
}

/// Append-mostly log of webhook deliveries.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Appends a delivery. Fails with `Duplicate` when a signature-valid
    /// delivery with the same provider event id was already logged for the
    /// gateway. Unsigned deliveries never claim an event id.
    async fn insert_notification(&self, notification: &PaymentNotification) -> Result<()>;

    async fn find_notification(&self, id: NotificationId) -> Result<Option<PaymentNotification>>;

    /// The signature-valid delivery logged under `event_id`, if any.
    async fn find_notification_by_event_id(
        &self,
        gateway: GatewayKind,
        event_id: &str,
    ) -> Result<Option<PaymentNotification>>;

    /// Unprocessed deliveries, oldest first.
    async fn list_unprocessed_notifications(&self, limit: usize)
    -> Result<Vec<PaymentNotification>>;

    /// Flags a delivery as processed, recording an optional error.
    async fn mark_notification_processed(
        &self,
        id: NotificationId,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Per-tenant gateway credentials.
#[async_trait]
pub trait GatewayConfigRepository: Send + Sync {
    /// Inserts or replaces the tenant's config for `config.gateway`.
    ///
    /// When the config is the default, any other default of the tenant is
    /// cleared in the same write. Returns the stored config, which keeps the
    /// id and creation time of a config it replaces.
    async fn save_config(&self, config: &GatewayConfig) -> Result<GatewayConfig>;

    /// The tenant's config for a gateway, active or not.
    async fn find_config(
        &self,
        tenant_id: TenantId,
        gateway: GatewayKind,
    ) -> Result<Option<GatewayConfig>>;

    async fn list_configs(&self, tenant_id: TenantId) -> Result<Vec<GatewayConfig>>;
}

/// Everything the engine persists.
pub trait PaymentStore:
    OrderRepository
    + TransactionRepository
    + RefundRepository
    + NotificationRepository
    + GatewayConfigRepository
{
}

impl<T> PaymentStore for T where
    T: OrderRepository
        + TransactionRepository
        + RefundRepository
        + NotificationRepository
        + GatewayConfigRepository
{
}
