//! Order creation, queries, cancellation and expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Currency, Money, TenantId};
use domain::{
    GatewayKind, OrderDraft, OrderStatus, PayerInfo, PaymentOrder, PaymentRefund,
    PaymentTransaction, generate_order_number,
};
use gateway::{GatewayCredentials, GatewayRegistry, RemoteOrderRequest};
use payment_store::{OrderQuery, PaymentStore};
use serde::{Deserialize, Serialize};

use crate::calls::gateway_call;
use crate::checkout::build_checkout_options;
use crate::outcome::{Failure, OrderCreation};
use crate::{CheckoutOptions, EngineConfig, EngineError, GatewayConfigStore, Result};

/// A request to open a payment order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub tenant_id: TenantId,
    /// Base amount in minor units, before any convenience fee.
    pub amount: Money,
    pub currency: Currency,
    pub purpose: String,
    #[serde(default)]
    pub description: Option<String>,
    pub payer: PayerInfo,
    /// Gateway to use; the tenant's default when absent.
    #[serde(default)]
    pub gateway: Option<GatewayKind>,
    #[serde(default)]
    pub ledger_record_id: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

/// An order with every attempt and refund made against it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: PaymentOrder,
    pub transactions: Vec<PaymentTransaction>,
    pub refunds: Vec<PaymentRefund>,
}

/// Persists the lazily-evaluated expiry of `order` if it is due.
///
/// Returns true when the order is (now) expired. A concurrent writer that
/// already moved the row is not an error.
pub(crate) async fn expire_if_due<S: PaymentStore>(
    store: &S,
    order: &mut PaymentOrder,
    now: DateTime<Utc>,
) -> Result<bool> {
    if !order.is_expired(now) {
        return Ok(order.status == OrderStatus::Expired);
    }
    let expected = order.status;
    order.transition_to(OrderStatus::Expired, now)?;
    match store.update_order(order, expected).await {
        Ok(()) => {
            tracing::info!(order_number = %order.order_number, "order expired on read");
            Ok(true)
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!(order_number = %order.order_number, "order already moved by another writer");
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

/// Creates and tracks payment orders.
#[derive(Clone)]
pub struct OrderManager<S: PaymentStore> {
    store: S,
    configs: GatewayConfigStore<S>,
    registry: Arc<GatewayRegistry>,
    config: Arc<EngineConfig>,
}

impl<S: PaymentStore + Clone> OrderManager<S> {
    pub fn new(store: S, registry: Arc<GatewayRegistry>, config: Arc<EngineConfig>) -> Self {
        Self {
            configs: GatewayConfigStore::new(store.clone()),
            store,
            registry,
            config,
        }
    }

    /// Opens an order and its remote counterpart.
    ///
    /// The order row is written before the gateway is called. A gateway
    /// failure leaves it `Failed` and comes back as a failed
    /// [`OrderCreation`], not as an error.
    #[tracing::instrument(skip(self, request), fields(tenant_id = %request.tenant_id, amount = %request.amount))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderCreation> {
        if request.purpose.trim().is_empty() {
            return Err(EngineError::InvalidRequest("purpose is required".to_string()));
        }
        if !request.amount.is_positive() {
            return Err(domain::DomainError::InvalidAmount(request.amount.minor_units()).into());
        }

        let config = self
            .configs
            .get_config(request.tenant_id, request.gateway)
            .await?
            .ok_or(EngineError::NoGatewayConfigured(request.tenant_id))?;
        let adapter = self
            .registry
            .get(config.gateway)
            .map_err(|_| EngineError::GatewayNotConfigured(config.gateway))?;

        let fee = config.fee_policy.convenience_fee(request.amount);
        let draft = OrderDraft {
            tenant_id: request.tenant_id,
            gateway: config.gateway,
            amount: request.amount,
            currency: request.currency,
            purpose: request.purpose,
            description: request.description,
            ledger_record_id: request.ledger_record_id,
            payer: request.payer,
            notes: if request.notes.is_null() {
                serde_json::json!({})
            } else {
                request.notes
            },
        };
        let mut order = self.insert_with_fresh_number(draft, fee).await?;

        let remote = gateway_call(
            "create_order",
            self.config.gateway_timeout,
            adapter.create_remote_order(
                &GatewayCredentials::from(&config),
                RemoteOrderRequest {
                    amount: order.total_amount,
                    currency: order.currency,
                    receipt: order.order_number.clone(),
                    notes: order.notes.clone(),
                },
            ),
        )
        .await;

        let now = Utc::now();
        let creation = match remote {
            Ok(remote) => {
                order.mark_opened(remote.id, remote.raw, now)?;
                self.store.update_order(&order, OrderStatus::Created).await?;
                let checkout = build_checkout_options(&order, &config)?;
                tracing::info!(
                    order_number = %order.order_number,
                    gateway_order_id = ?order.gateway_order_id,
                    total = %order.total_amount,
                    "order opened"
                );
                OrderCreation {
                    order,
                    checkout: Some(checkout),
                    failure: None,
                }
            }
            Err(error) => {
                let failure = Failure::from_gateway(&error);
                order.mark_failed(error.to_string(), None, now)?;
                self.store.update_order(&order, OrderStatus::Created).await?;
                tracing::warn!(order_number = %order.order_number, error = %error, "remote order creation failed");
                OrderCreation {
                    order,
                    checkout: None,
                    failure: Some(failure),
                }
            }
        };

        metrics::counter!(
            "payment_orders_created_total",
            "gateway" => config.gateway.as_str(),
            "status" => creation.order.status.as_str()
        )
        .increment(1);
        Ok(creation)
    }

    async fn insert_with_fresh_number(&self, draft: OrderDraft, fee: Money) -> Result<PaymentOrder> {
        let attempts = self.config.order_number_attempts.max(1);
        let mut attempt = 1;
        loop {
            let now = Utc::now();
            let number = generate_order_number(&self.config.order_number_prefix, now);
            let order = PaymentOrder::open(draft.clone(), fee, number, now, self.config.order_ttl)?;
            match self.store.insert_order(&order).await {
                Ok(()) => return Ok(order),
                Err(e) if e.is_duplicate() && attempt < attempts => {
                    tracing::debug!(attempt, order_number = %order.order_number, "order number collision, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Moves every stale unpaid order to `Expired`. Returns how many moved.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_orders(&self) -> Result<usize> {
        let expired = self.store.expire_stale_orders(Utc::now()).await?;
        if !expired.is_empty() {
            metrics::counter!("payment_orders_expired_total").increment(expired.len() as u64);
            tracing::info!(count = expired.len(), "expired stale orders");
        }
        Ok(expired.len())
    }

    /// Cancels an order that has not been captured.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, tenant_id: TenantId, order_number: &str) -> Result<PaymentOrder> {
        let mut order = self.load(tenant_id, order_number).await?;
        let now = Utc::now();
        if expire_if_due(&self.store, &mut order, now).await? {
            return Err(EngineError::OrderExpired(order.order_number));
        }
        let expected = order.status;
        if order.transition_to(OrderStatus::Cancelled, now)?.is_changed() {
            self.store.update_order(&order, expected).await?;
            tracing::info!(order_number = %order.order_number, from = %expected, "order cancelled");
        }
        Ok(order)
    }

    /// An order with its transactions and refunds. Status is reported as of now.
    pub async fn get_order(&self, tenant_id: TenantId, order_number: &str) -> Result<OrderDetails> {
        let mut order = self.load(tenant_id, order_number).await?;
        order.status = order.effective_status(Utc::now());
        let transactions = self
            .store
            .list_transactions_for_order(tenant_id, order.id)
            .await?;
        let refunds = self.store.list_refunds_for_order(tenant_id, order.id).await?;
        Ok(OrderDetails {
            order,
            transactions,
            refunds,
        })
    }

    /// A tenant's orders, newest first, with expiry applied to the reported status.
    pub async fn list_orders(&self, tenant_id: TenantId, query: &OrderQuery) -> Result<Vec<PaymentOrder>> {
        let now = Utc::now();
        let mut orders = self.store.list_orders(tenant_id, query).await?;
        for order in &mut orders {
            order.status = order.effective_status(now);
        }
        if let Some(status) = query.status {
            orders.retain(|o| o.status == status);
        }
        Ok(orders)
    }

    /// Checkout options for a pending order.
    pub async fn checkout_options(&self, tenant_id: TenantId, order_number: &str) -> Result<CheckoutOptions> {
        let mut order = self.load(tenant_id, order_number).await?;
        if expire_if_due(&self.store, &mut order, Utc::now()).await? {
            return Err(EngineError::OrderExpired(order.order_number));
        }
        if order.status != OrderStatus::Pending {
            return Err(EngineError::OrderNotPayable {
                order_number: order.order_number,
                status: order.status,
            });
        }
        let config = self.configs.config_for_order(&order).await?;
        build_checkout_options(&order, &config)
    }

    async fn load(&self, tenant_id: TenantId, order_number: &str) -> Result<PaymentOrder> {
        self.store
            .find_order_by_number(tenant_id, order_number)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_number.to_string()))
    }
}
