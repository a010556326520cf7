use common::Money;
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when reading or writing payment records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored status no longer matches the status the writer read.
    #[error("Concurrency conflict for {entity} {id}: expected status {expected}, found {actual}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// A refund reservation that would push refunds past the transaction amount.
    #[error("Refund exceeds balance of transaction {transaction_id}: {available} available")]
    BalanceExceeded {
        transaction_id: String,
        available: Money,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value that no longer parses into the domain model.
    #[error("Corrupt record: {0}")]
    Corrupt(#[from] DomainError),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
