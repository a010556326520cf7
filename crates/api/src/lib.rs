//! HTTP API for the school payment engine.
//!
//! Exposes gateway configuration, orders, verification, refunds, webhooks and
//! stats over REST, with structured logging (tracing) and Prometheus metrics.
//! Every route except `/health`, `/metrics` and the webhook sink acts for the
//! tenant named in the `X-Tenant-Id` header.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use engine::{EngineConfig, InMemoryFeeLedger, InMemoryReceiptNotifier, PaymentEngine};
use gateway::GatewayRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use payment_store::PaymentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: PaymentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/payments/gateways",
            get(routes::gateways::list::<S>).put(routes::gateways::save::<S>),
        )
        .route(
            "/payments/gateways/{gateway}",
            axum::routing::delete(routes::gateways::deactivate::<S>),
        )
        .route(
            "/payments/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route("/payments/orders/{order_number}", get(routes::orders::get::<S>))
        .route(
            "/payments/orders/{order_number}/checkout",
            get(routes::orders::checkout::<S>),
        )
        .route(
            "/payments/orders/{order_number}/cancel",
            post(routes::orders::cancel::<S>),
        )
        .route("/payments/verify", post(routes::payments::verify::<S>))
        .route(
            "/payments/transactions/{id}/capture",
            post(routes::payments::capture::<S>),
        )
        .route("/payments/refunds", post(routes::payments::refund::<S>))
        .route(
            "/payments/webhooks/{gateway}",
            post(routes::webhooks::receive::<S>),
        )
        .route("/payments/stats", get(routes::stats::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed by `store`, with in-process fee ledger
/// and receipt notifier.
pub fn create_default_state<S: PaymentStore + Clone + 'static>(
    store: S,
    registry: GatewayRegistry,
    config: EngineConfig,
) -> Arc<AppState<S>> {
    let engine = PaymentEngine::new(
        store,
        registry,
        Arc::new(InMemoryFeeLedger::new()),
        Arc::new(InMemoryReceiptNotifier::new()),
        config,
    );
    Arc::new(AppState { engine })
}
