//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TenantId;
use engine::EngineConfig;
use gateway::signature::{payment_message, sign_hex};
use gateway::{GatewayRegistry, InMemoryGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use payment_store::InMemoryPaymentStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const KEY_SECRET: &str = "rzp_test_secret";
const WEBHOOK_SECRET: &str = "whsec_tenant";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    gateway: InMemoryGateway,
    tenant: TenantId,
}

impl TestApp {
    fn new() -> Self {
        let gateway = InMemoryGateway::new();
        let registry = GatewayRegistry::new().with(Arc::new(gateway.clone()));
        let state = api::create_default_state(
            InMemoryPaymentStore::new(),
            registry,
            EngineConfig::default(),
        );
        Self {
            app: api::create_app(state, get_metrics_handle()),
            gateway,
            tenant: TenantId::new(),
        }
    }

    /// An app whose tenant already has a default Razorpay config with a 2% passed-on fee.
    async fn configured() -> Self {
        let app = Self::new();
        let (status, _) = app
            .send(
                "PUT",
                "/payments/gateways",
                Some(json!({
                    "gateway": "razorpay",
                    "key_id": "rzp_test_key",
                    "key_secret": KEY_SECRET,
                    "webhook_secret": WEBHOOK_SECRET,
                    "is_default": true,
                    "is_test_mode": true,
                    "convenience_fee_bps": 200,
                    "pass_fee_to_customer": true,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        app
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_as(Some(self.tenant), method, uri, body).await
    }

    async fn send_as(
        &self,
        tenant: Option<TenantId>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tenant) = tenant {
            builder = builder.header("x-tenant-id", tenant.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn create_order(&self, amount: i64) -> Value {
        let (status, json) = self
            .send(
                "POST",
                "/payments/orders",
                Some(json!({
                    "amount": amount,
                    "currency": "INR",
                    "purpose": "Term 1 tuition",
                    "payer": { "name": "Meera Iyer", "email": "meera@example.com" },
                    "ledger_record_id": "invoice-42",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json
    }

    /// Pays an order at the fake gateway and returns a correctly signed callback body.
    fn pay(&self, order: &Value, provider_status: &str) -> Value {
        let remote_order = order["gateway_order_id"].as_str().unwrap();
        let payment_id = self.gateway.complete_checkout(remote_order, provider_status, "upi");
        let signature = sign_hex(
            KEY_SECRET.as_bytes(),
            payment_message(remote_order, &payment_id).as_bytes(),
        );
        json!({
            "razorpay_order_id": remote_order,
            "razorpay_payment_id": payment_id,
            "razorpay_signature": signature,
        })
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, json) = app.send_as(None, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_missing_tenant_header_is_rejected() {
    let app = TestApp::new();
    let (status, json) = app.send_as(None, "GET", "/payments/orders", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_invalid_tenant_header_is_rejected() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/payments/orders")
        .header("x-tenant-id", "school-17")
        .body(Body::empty())
        .unwrap();

    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gateway_config_never_exposes_secrets() {
    let app = TestApp::configured().await;
    let (status, json) = app.send("GET", "/payments/gateways", None).await;

    assert_eq!(status, StatusCode::OK);
    let configs = json.as_array().unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0]["key_id"], "rzp_test_key");
    assert_eq!(configs[0]["has_webhook_secret"], true);

    let raw = json.to_string();
    assert!(!raw.contains(KEY_SECRET));
    assert!(!raw.contains(WEBHOOK_SECRET));
}

#[tokio::test]
async fn test_invalid_fee_policy_is_rejected() {
    let app = TestApp::new();
    let (status, _) = app
        .send(
            "PUT",
            "/payments/gateways",
            Some(json!({
                "gateway": "razorpay",
                "key_id": "rzp_test_key",
                "key_secret": KEY_SECRET,
                "convenience_fee_bps": 20_000,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_order_without_config() {
    let app = TestApp::new();
    let (status, json) = app
        .send(
            "POST",
            "/payments/orders",
            Some(json!({
                "amount": 1000,
                "currency": "INR",
                "purpose": "Term 1 tuition",
                "payer": { "name": "Meera Iyer" },
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "NO_GATEWAY_CONFIGURED");
    assert_eq!(app.gateway.order_calls(), 0);
}

#[tokio::test]
async fn test_create_order_and_checkout() {
    let app = TestApp::configured().await;
    let created = app.create_order(1000).await;

    let order = &created["order"];
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["convenience_fee"], 20);
    assert_eq!(order["total_amount"], 1020);
    assert_eq!(created["checkout"]["key"], "rzp_test_key");

    let number = order["order_number"].as_str().unwrap();
    let (status, checkout) = app
        .send("GET", &format!("/payments/orders/{number}/checkout"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(checkout["amount"], 1020);
    assert_eq!(checkout["currency"], "INR");
    assert_eq!(checkout["order_id"], order["gateway_order_id"]);
}

#[tokio::test]
async fn test_verify_captured_payment() {
    let app = TestApp::configured().await;
    let created = app.create_order(1000).await;
    let callback = app.pay(&created["order"], "captured");

    let (status, json) = app.send("POST", "/payments/verify", Some(callback)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["success"], true);
    assert_eq!(json["order_status"], "CAPTURED");
    assert_eq!(json["transaction"]["status"], "CAPTURED");

    let number = created["order"]["order_number"].as_str().unwrap();
    let (status, details) = app
        .send("GET", &format!("/payments/orders/{number}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["order"]["status"], "CAPTURED");
    assert_eq!(details["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_verify_forged_signature() {
    let app = TestApp::configured().await;
    let created = app.create_order(1000).await;
    let mut callback = app.pay(&created["order"], "captured");
    callback["razorpay_signature"] = json!("deadbeef");

    let (status, json) = app.send("POST", "/payments/verify", Some(callback)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["success"], false);
    assert_eq!(json["failure"]["kind"], "SIGNATURE_INVALID");
    assert_eq!(json["order_status"], "PENDING");
    assert_eq!(app.gateway.fetch_calls(), 0);
}

#[tokio::test]
async fn test_verify_unknown_order() {
    let app = TestApp::configured().await;
    let (status, json) = app
        .send(
            "POST",
            "/payments/verify",
            Some(json!({
                "gateway_order_id": "order_missing",
                "gateway_payment_id": "pay_missing",
                "signature": "00",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn test_refunds() {
    let app = TestApp::configured().await;
    let created = app.create_order(1000).await;
    let callback = app.pay(&created["order"], "captured");
    let (_, verified) = app.send("POST", "/payments/verify", Some(callback)).await;
    let transaction_id = verified["transaction"]["id"].clone();

    let (status, json) = app
        .send(
            "POST",
            "/payments/refunds",
            Some(json!({
                "transaction_id": transaction_id,
                "amount": 5000,
                "reason": "Overpaid",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "REFUND_EXCEEDS_BALANCE");

    let (status, json) = app
        .send(
            "POST",
            "/payments/refunds",
            Some(json!({
                "transaction_id": transaction_id,
                "amount": 500,
                "reason": "Bus fee waived",
                "initiated_by": "accounts",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["success"], true);
    assert_eq!(json["refund"]["status"], "COMPLETED");
    assert_eq!(json["refund"]["amount"], 500);

    let number = created["order"]["order_number"].as_str().unwrap();
    let (_, details) = app
        .send("GET", &format!("/payments/orders/{number}"), None)
        .await;
    assert_eq!(details["order"]["status"], "PARTIALLY_REFUNDED");
}

#[tokio::test]
async fn test_cancel_order_then_checkout() {
    let app = TestApp::configured().await;
    let created = app.create_order(1000).await;
    let number = created["order"]["order_number"].as_str().unwrap();

    let (status, json) = app
        .send("POST", &format!("/payments/orders/{number}/cancel"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "CANCELLED");

    let (status, json) = app
        .send("GET", &format!("/payments/orders/{number}/checkout"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "ORDER_NOT_PAYABLE");
}

#[tokio::test]
async fn test_orders_are_tenant_scoped() {
    let app = TestApp::configured().await;
    let created = app.create_order(1000).await;
    let number = created["order"]["order_number"].as_str().unwrap();

    let other = Some(TenantId::new());
    let (status, _) = app
        .send_as(other, "GET", &format!("/payments/orders/{number}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = app.send_as(other, "GET", "/payments/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_orders_by_status() {
    let app = TestApp::configured().await;
    app.create_order(1000).await;
    app.create_order(2500).await;

    let (status, json) = app
        .send("GET", "/payments/orders?status=pending", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, json) = app
        .send("GET", "/payments/orders?status=captured", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());

    let (status, _) = app.send("GET", "/payments/orders?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forged_webhook_is_acknowledged() {
    let app = TestApp::configured().await;
    let created = app.create_order(1000).await;
    let body = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_forged",
            "order_id": created["order"]["gateway_order_id"],
        }}},
    })
    .to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/payments/webhooks/razorpay")
        .header("content-type", "application/json")
        .header(
            "x-razorpay-signature",
            sign_hex(b"wrong-secret", body.as_bytes()),
        )
        .header("x-razorpay-event-id", "evt_forged")
        .body(Body::from(body))
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let ack: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(ack["signature_valid"], false);
    assert_eq!(ack["duplicate"], false);

    let number = created["order"]["order_number"].as_str().unwrap();
    let (_, details) = app
        .send("GET", &format!("/payments/orders/{number}"), None)
        .await;
    assert_eq!(details["order"]["status"], "PENDING");
}

#[tokio::test]
async fn test_webhook_for_unknown_gateway() {
    let app = TestApp::new();
    let (status, _) = app
        .send_as(None, "POST", "/payments/webhooks/paypal", Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_stats() {
    let app = TestApp::configured().await;
    let paid = app.create_order(1000).await;
    app.create_order(2000).await;
    let callback = app.pay(&paid["order"], "captured");
    app.send("POST", "/payments/verify", Some(callback)).await;

    let (status, json) = app.send("GET", "/payments/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_orders"], 2);
    assert_eq!(json["paid_orders"], 1);
    assert_eq!(json["by_currency"]["INR"]["gross_captured"], 1020);
    assert_eq!(json["success_rate"], 0.5);

    let (status, _) = app
        .send(
            "GET",
            "/payments/stats?from=2026-02-01T00:00:00Z&to=2026-01-01T00:00:00Z",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::configured().await;
    app.create_order(1000).await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("payment_orders_created_total"));
}
