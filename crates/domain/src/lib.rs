//! Payment domain model.
//!
//! This crate holds the records the payment engine persists and the rules that
//! keep them consistent:
//! - status state machines that only move forward
//! - fee policy arithmetic in minor units
//! - lazily evaluated order expiry
//! - refund balance accounting

pub mod error;
pub mod gateway_config;
pub mod notification;
pub mod order;
pub mod refund;
pub mod status;
pub mod transaction;

pub use error::DomainError;
pub use gateway_config::{FeePolicy, GatewayConfig, GatewayKind, PaymentMethod};
pub use notification::PaymentNotification;
pub use order::{OrderDraft, PayerInfo, PaymentOrder, generate_order_number};
pub use refund::{PaymentRefund, completed_total, refundable_balance};
pub use status::{OrderStatus, RefundStatus, Transition, TransactionStatus};
pub use transaction::{DUPLICATE_CAPTURE, PaymentTransaction, SIGNATURE_INVALID};
