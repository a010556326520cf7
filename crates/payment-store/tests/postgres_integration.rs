//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p payment-store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Currency, Money, TenantId};
use domain::{
    FeePolicy, GatewayConfig, GatewayKind, OrderDraft, OrderStatus, PayerInfo, PaymentMethod,
    PaymentNotification, PaymentOrder, PaymentRefund, PaymentTransaction, RefundStatus,
    TransactionStatus,
};
use payment_store::{
    GatewayConfigRepository, NotificationRepository, OrderQuery, OrderRepository,
    PostgresPaymentStore, RefundRepository, StoreError, TimeRange, TransactionRepository,
};
use secrecy::ExposeSecret;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_payment_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresPaymentStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE payment_refunds, payment_transactions, payment_orders, \
         payment_notifications, gateway_configs",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresPaymentStore::new(pool)
}

fn draft(tenant_id: TenantId) -> OrderDraft {
    OrderDraft {
        tenant_id,
        gateway: GatewayKind::Razorpay,
        amount: Money::from_minor(1000),
        currency: Currency::Inr,
        purpose: "tuition".to_string(),
        description: Some("Term 1".to_string()),
        ledger_record_id: Some("fee-42".to_string()),
        payer: PayerInfo {
            name: "Asha".to_string(),
            email: Some("asha@example.com".to_string()),
            phone: None,
            user_id: Some(uuid::Uuid::new_v4()),
        },
        notes: serde_json::json!({"term": 1}),
    }
}

fn open_order(tenant_id: TenantId, number: &str) -> PaymentOrder {
    PaymentOrder::open(
        draft(tenant_id),
        Money::from_minor(20),
        number.to_string(),
        Utc::now(),
        Duration::hours(24),
    )
    .unwrap()
}

async fn pending_order(store: &PostgresPaymentStore, tenant_id: TenantId, number: &str) -> PaymentOrder {
    let mut order = open_order(tenant_id, number);
    store.insert_order(&order).await.unwrap();
    order
        .mark_opened(format!("order_{number}"), serde_json::json!({"id": number}), Utc::now())
        .unwrap();
    store.update_order(&order, OrderStatus::Created).await.unwrap();
    order
}

#[tokio::test]
#[serial]
async fn order_roundtrip_preserves_fields() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let order = pending_order(&store, tenant, "PAY1").await;

    let found = store
        .find_order_by_number(tenant, "PAY1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, order.id);
    assert_eq!(found.total_amount, Money::from_minor(1020));
    assert_eq!(found.status, OrderStatus::Pending);
    assert_eq!(found.payer, order.payer);
    assert_eq!(found.notes, serde_json::json!({"term": 1}));

    let by_remote = store.find_by_gateway_order_id("order_PAY1").await.unwrap();
    assert_eq!(by_remote.unwrap().id, order.id);
}

#[tokio::test]
#[serial]
async fn duplicate_order_number_maps_to_duplicate() {
    let store = get_test_store().await;
    store.insert_order(&open_order(TenantId::new(), "PAY1")).await.unwrap();

    let err = store
        .insert_order(&open_order(TenantId::new(), "PAY1"))
        .await
        .unwrap_err();
    assert!(err.is_duplicate(), "got {err:?}");
}

#[tokio::test]
#[serial]
async fn other_tenant_cannot_read_or_update() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let order = pending_order(&store, tenant, "PAY1").await;

    let intruder = TenantId::new();
    assert!(store.find_order(intruder, order.id).await.unwrap().is_none());

    let mut forged = order.clone();
    forged.tenant_id = intruder;
    forged.status = OrderStatus::Cancelled;
    let err = store
        .update_order(&forged, OrderStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[serial]
async fn conditional_update_detects_moved_status() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let mut order = pending_order(&store, tenant, "PAY1").await;

    order.transition_to(OrderStatus::Captured, Utc::now()).unwrap();
    store.update_order(&order, OrderStatus::Pending).await.unwrap();

    let err = store
        .update_order(&order, OrderStatus::Pending)
        .await
        .unwrap_err();
    match err {
        StoreError::ConcurrencyConflict { actual, .. } => assert_eq!(actual, "CAPTURED"),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn expire_sweep_is_idempotent() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let mut stale = open_order(tenant, "PAY1");
    stale.expires_at = Utc::now() - Duration::minutes(1);
    store.insert_order(&stale).await.unwrap();
    store.insert_order(&open_order(tenant, "PAY2")).await.unwrap();

    let expired = store.expire_stale_orders(Utc::now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].status, OrderStatus::Expired);
    assert!(store.expire_stale_orders(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn list_orders_filters_by_status() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    pending_order(&store, tenant, "PAY1").await;
    store.insert_order(&open_order(tenant, "PAY2")).await.unwrap();

    let pending = store
        .list_orders(tenant, &OrderQuery::new().status(OrderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].order_number, "PAY1");

    let all = store.list_orders(tenant, &OrderQuery::new().limit(10)).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
#[serial]
async fn transactions_and_refunds_respect_ceiling() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let order = pending_order(&store, tenant, "PAY1").await;

    let mut tx = PaymentTransaction::attempt(&order, "order_PAY1", "pay_1", "sig", true, Utc::now());
    store.insert_transaction(&tx).await.unwrap();
    tx.mark_captured(Some("card".to_string()), serde_json::json!({}), Utc::now())
        .unwrap();
    store
        .update_transaction(&tx, TransactionStatus::Pending)
        .await
        .unwrap();

    let found = store
        .find_transaction_by_payment_id(tenant, "pay_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.status, TransactionStatus::Captured);

    let mut first = PaymentRefund::request(&tx, Money::from_minor(1000), "r", "admin", Utc::now()).unwrap();
    store.reserve_refund(&first, tx.amount).await.unwrap();

    let second = PaymentRefund::request(&tx, Money::from_minor(21), "r", "admin", Utc::now()).unwrap();
    let err = store.reserve_refund(&second, tx.amount).await.unwrap_err();
    assert!(matches!(err, StoreError::BalanceExceeded { available, .. } if available == Money::from_minor(20)));

    first
        .complete("rfnd_1".to_string(), serde_json::json!({}), Utc::now())
        .unwrap();
    store.update_refund(&first, RefundStatus::Pending).await.unwrap();

    let refunds = store
        .list_refunds_for_transaction(tenant, tx.id)
        .await
        .unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].status, RefundStatus::Completed);
    assert_eq!(
        store.list_refunds(tenant, TimeRange::all()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
#[serial]
async fn notifications_dedupe_by_event_id() {
    let store = get_test_store().await;
    let mut notification = PaymentNotification::received(
        GatewayKind::Razorpay,
        "payment.captured",
        serde_json::json!({"event": "payment.captured"}),
        serde_json::json!({"x-razorpay-event-id": "evt_1"}),
        Some("sig".to_string()),
        true,
        Utc::now(),
    );
    notification.event_id = Some("evt_1".to_string());
    store.insert_notification(&notification).await.unwrap();

    let mut retry = notification.clone();
    retry.id = common::NotificationId::new();
    assert!(store.insert_notification(&retry).await.unwrap_err().is_duplicate());

    let pending = store.list_unprocessed_notifications(10).await.unwrap();
    assert_eq!(pending.len(), 1);

    store
        .mark_notification_processed(notification.id, Some("no match".to_string()), Utc::now())
        .await
        .unwrap();
    let stored = store.find_notification(notification.id).await.unwrap().unwrap();
    assert!(stored.processed);
    assert_eq!(stored.processing_error.as_deref(), Some("no match"));
}

#[tokio::test]
#[serial]
async fn config_upsert_keeps_single_default() {
    let store = get_test_store().await;
    let tenant = TenantId::new();
    let config = GatewayConfig::new(tenant, GatewayKind::Razorpay, "rzp_key", "secret")
        .with_webhook_secret("whsec")
        .with_fee_policy(FeePolicy::passed_to_customer(200, Money::from_minor(5)))
        .with_methods([PaymentMethod::Card, PaymentMethod::Upi])
        .as_default();

    let stored = store.save_config(&config).await.unwrap();
    assert_eq!(stored.id, config.id);
    assert_eq!(stored.key_secret.expose_secret(), "secret");
    assert_eq!(stored.fee_policy, config.fee_policy);
    assert_eq!(stored.supported_methods, vec![PaymentMethod::Card, PaymentMethod::Upi]);

    let replacement = GatewayConfig::new(tenant, GatewayKind::Razorpay, "rzp_key2", "secret2");
    let replaced = store.save_config(&replacement).await.unwrap();
    assert_eq!(replaced.id, config.id);
    assert_eq!(replaced.key_id, "rzp_key2");

    let configs = store.list_configs(tenant).await.unwrap();
    assert_eq!(configs.len(), 1);
    assert!(store.find_config(TenantId::new(), GatewayKind::Razorpay).await.unwrap().is_none());
}
