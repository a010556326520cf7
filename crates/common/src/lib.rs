//! Shared types for the payment engine.
//!
//! Identifiers are UUID newtypes so a tenant id can never be passed where an
//! order id is expected. Amounts are integer minor currency units.

pub mod ids;
pub mod money;

pub use ids::{ConfigId, NotificationId, OrderId, RefundId, TenantId, TransactionId};
pub use money::{Currency, CurrencyError, Money};
