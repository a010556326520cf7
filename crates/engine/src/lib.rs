//! Payment engine.
//!
//! Components, each generic over the [`PaymentStore`](payment_store::PaymentStore)
//! it persists to:
//! - [`GatewayConfigStore`]: per-tenant gateway credentials and checkout options
//! - [`OrderManager`]: order creation, cancellation, queries and expiry
//! - [`VerificationEngine`]: checkout callback verification and capture
//! - [`RefundProcessor`]: full and partial refunds
//! - [`WebhookIngestor`]: audit log of provider webhooks
//! - [`StatsAggregator`]: reporting rollups
//! - [`spawn_expiry_sweeper`]: periodic expiry bookkeeping
//!
//! [`PaymentEngine`] wires them together behind one facade.

pub mod checkout;
pub mod collaborators;
pub mod config;
pub mod config_store;
pub mod engine;
pub mod error;
pub mod orders;
pub mod outcome;
pub mod refunds;
pub mod stats;
pub mod sweeper;
pub mod verification;
pub mod webhooks;

mod calls;

pub use checkout::{CheckoutOptions, CheckoutPrefill, MethodFlags, build_checkout_options};
pub use collaborators::{
    CollaboratorError, FeeLedger, InMemoryFeeLedger, InMemoryReceiptNotifier, Receipt,
    ReceiptNotifier,
};
pub use config::EngineConfig;
pub use config_store::{ConfigSummary, GatewayConfigStore};
pub use engine::PaymentEngine;
pub use error::{EngineError, Result};
pub use orders::{CreateOrderRequest, OrderDetails, OrderManager};
pub use outcome::{
    Failure, FailureKind, OrderCreation, RefundOutcome, VerificationOutcome, WebhookAck,
};
pub use refunds::{CreateRefundRequest, RefundProcessor};
pub use stats::{CurrencyTotals, PaymentStats, StatsAggregator};
pub use sweeper::spawn_expiry_sweeper;
pub use verification::{VerificationEngine, VerifyPaymentRequest};
pub use webhooks::WebhookIngestor;
