//! Persistence for the payment engine.
//!
//! Every lookup except [`OrderRepository::find_order_by_gateway_order_id`] is
//! scoped by tenant. Status updates are conditional on the status the caller
//! read, so two writers racing on the same record cannot both win.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use query::{OrderQuery, TimeRange};
pub use store::{
    GatewayConfigRepository, NotificationRepository, OrderRepository, PaymentStore,
    RefundRepository, TransactionRepository,
};
