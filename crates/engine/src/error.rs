//! Engine error types.

use common::{Money, NotificationId, TenantId, TransactionId};
use domain::{DomainError, GatewayKind, OrderStatus};
use gateway::GatewayError;
use payment_store::StoreError;
use thiserror::Error;

/// Rejections an engine operation returns before (or instead of) changing state.
///
/// Expected business outcomes such as a forged signature or a gateway
/// declining a refund are not errors; they come back as outcome values.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The tenant has no active gateway config to create orders with.
    #[error("No active payment gateway configured for tenant {0}")]
    NoGatewayConfigured(TenantId),

    /// The order's gateway config was removed or disabled after creation.
    #[error("Gateway {0} is not configured or has been disabled")]
    GatewayNotConfigured(GatewayKind),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order {0} has expired")]
    OrderExpired(String),

    #[error("Order {order_number} cannot be paid in status {status}")]
    OrderNotPayable {
        order_number: String,
        status: OrderStatus,
    },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("Transaction {0} is not refundable")]
    TransactionNotRefundable(String),

    #[error("Refund of {requested} exceeds refundable balance of {available}")]
    RefundExceedsBalance { requested: Money, available: Money },

    #[error("Notification not found: {0}")]
    NotificationNotFound(NotificationId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
