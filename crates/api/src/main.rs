//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use gateway::{GatewayRegistry, RazorpayAdapter};
use payment_store::{InMemoryPaymentStore, PaymentStore, PostgresPaymentStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Builds the app around `store`, starts the expiry sweeper and serves until shutdown.
async fn serve<S: PaymentStore + Clone + 'static>(
    config: &Config,
    store: S,
    registry: GatewayRegistry,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) {
    let state = api::create_default_state(store, registry, config.engine_config());
    let sweeper = engine::spawn_expiry_sweeper(
        Arc::new(state.engine.clone()),
        config.expiry_sweep_interval,
    );
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.abort();
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Gateway adapters
    let engine_config = config.engine_config();
    let razorpay = RazorpayAdapter::new(&config.razorpay_base_url, engine_config.gateway_timeout)
        .expect("failed to build Razorpay client");
    let registry = GatewayRegistry::new().with(Arc::new(razorpay));

    // 4. Storage, then serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresPaymentStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL payment store");
            serve(&config, store, registry, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory payment store");
            serve(&config, InMemoryPaymentStore::new(), registry, metrics_handle).await;
        }
    }
}
