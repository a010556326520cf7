//! Payment gateway integration.
//!
//! A [`GatewayAdapter`] wraps one provider's HTTP API and signature scheme.
//! Adapters are looked up by [`GatewayKind`](domain::GatewayKind) through a
//! [`GatewayRegistry`], so order, verification and refund logic never branch
//! on the provider.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod razorpay;
pub mod registry;
pub mod signature;

pub use adapter::{
    GatewayAdapter, GatewayCredentials, RemoteOrder, RemoteOrderRequest, RemotePayment,
    RemotePaymentStatus, RemoteRefund, WebhookSummary,
};
pub use error::GatewayError;
pub use memory::InMemoryGateway;
pub use razorpay::RazorpayAdapter;
pub use registry::GatewayRegistry;
