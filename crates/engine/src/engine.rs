//! One handle over every engine component.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{NotificationId, TenantId, TransactionId};
use domain::{GatewayConfig, GatewayKind, PaymentNotification, PaymentOrder};
use gateway::GatewayRegistry;
use payment_store::{OrderQuery, PaymentStore, TimeRange};

use crate::outcome::{OrderCreation, RefundOutcome, VerificationOutcome, WebhookAck};
use crate::{
    CheckoutOptions, ConfigSummary, CreateOrderRequest, CreateRefundRequest, EngineConfig,
    FeeLedger, GatewayConfigStore, OrderDetails, OrderManager, PaymentStats, ReceiptNotifier,
    RefundProcessor, Result, StatsAggregator, VerificationEngine, VerifyPaymentRequest,
    WebhookIngestor,
};

/// The payment engine, wired over one store and one gateway registry.
#[derive(Clone)]
pub struct PaymentEngine<S: PaymentStore> {
    configs: GatewayConfigStore<S>,
    orders: OrderManager<S>,
    verification: VerificationEngine<S>,
    refunds: RefundProcessor<S>,
    webhooks: WebhookIngestor<S>,
    stats: StatsAggregator<S>,
}

impl<S: PaymentStore + Clone> PaymentEngine<S> {
    pub fn new(
        store: S,
        registry: GatewayRegistry,
        ledger: Arc<dyn FeeLedger>,
        notifier: Arc<dyn ReceiptNotifier>,
        config: EngineConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        let config = Arc::new(config);
        tracing::debug!(gateways = ?registry.kinds().collect::<Vec<_>>(), "payment engine ready");
        Self {
            configs: GatewayConfigStore::new(store.clone()),
            orders: OrderManager::new(store.clone(), registry.clone(), config.clone()),
            verification: VerificationEngine::new(
                store.clone(),
                registry.clone(),
                config.clone(),
                ledger,
                notifier,
            ),
            refunds: RefundProcessor::new(store.clone(), registry.clone(), config.clone()),
            webhooks: WebhookIngestor::new(store.clone(), registry, config),
            stats: StatsAggregator::new(store),
        }
    }

    pub async fn get_config(
        &self,
        tenant_id: TenantId,
        gateway: Option<GatewayKind>,
    ) -> Result<Option<GatewayConfig>> {
        self.configs.get_config(tenant_id, gateway).await
    }

    pub async fn save_config(&self, config: GatewayConfig) -> Result<ConfigSummary> {
        self.configs.save_config(config).await
    }

    pub async fn deactivate_config(&self, tenant_id: TenantId, gateway: GatewayKind) -> Result<ConfigSummary> {
        self.configs.deactivate_config(tenant_id, gateway).await
    }

    pub async fn list_configs(&self, tenant_id: TenantId) -> Result<Vec<ConfigSummary>> {
        self.configs.list_configs(tenant_id).await
    }

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderCreation> {
        self.orders.create_order(request).await
    }

    pub async fn cancel_order(&self, tenant_id: TenantId, order_number: &str) -> Result<PaymentOrder> {
        self.orders.cancel_order(tenant_id, order_number).await
    }

    pub async fn get_order(&self, tenant_id: TenantId, order_number: &str) -> Result<OrderDetails> {
        self.orders.get_order(tenant_id, order_number).await
    }

    pub async fn list_orders(&self, tenant_id: TenantId, query: &OrderQuery) -> Result<Vec<PaymentOrder>> {
        self.orders.list_orders(tenant_id, query).await
    }

    pub async fn checkout_options(&self, tenant_id: TenantId, order_number: &str) -> Result<CheckoutOptions> {
        self.orders.checkout_options(tenant_id, order_number).await
    }

    pub async fn expire_stale_orders(&self) -> Result<usize> {
        self.orders.expire_stale_orders().await
    }

    pub async fn verify_payment(&self, request: VerifyPaymentRequest) -> Result<VerificationOutcome> {
        self.verification.verify_payment(request).await
    }

    pub async fn capture_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<VerificationOutcome> {
        self.verification
            .capture_transaction(tenant_id, transaction_id)
            .await
    }

    pub async fn create_refund(&self, request: CreateRefundRequest) -> Result<RefundOutcome> {
        self.refunds.create_refund(request).await
    }

    pub async fn handle_webhook(
        &self,
        gateway: GatewayKind,
        body: &[u8],
        headers: &BTreeMap<String, String>,
    ) -> Result<WebhookAck> {
        self.webhooks.handle_webhook(gateway, body, headers).await
    }

    pub async fn pending_notifications(&self, limit: usize) -> Result<Vec<PaymentNotification>> {
        self.webhooks.pending_notifications(limit).await
    }

    pub async fn mark_notification_processed(
        &self,
        id: NotificationId,
        error: Option<String>,
    ) -> Result<PaymentNotification> {
        self.webhooks.mark_notification_processed(id, error).await
    }

    pub async fn payment_stats(&self, tenant_id: TenantId, range: TimeRange) -> Result<PaymentStats> {
        self.stats.payment_stats(tenant_id, range).await
    }
}
