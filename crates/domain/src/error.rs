//! Domain error types.

use common::CurrencyError;
use thiserror::Error;

/// Errors raised by domain rules.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A status change that would move a record backwards or out of a terminal state.
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Amounts must be positive and must not overflow.
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error(transparent)]
    UnsupportedCurrency(#[from] CurrencyError),

    /// Fee policy outside the accepted range.
    #[error("Invalid fee policy: {0}")]
    InvalidFeePolicy(String),

    /// Gateway config missing a required field.
    #[error("Invalid gateway config: {0}")]
    InvalidConfig(String),

    /// A transaction cannot be authorized or captured without a verified signature.
    #[error("Transaction {0} has no verified signature")]
    UnverifiedSignature(String),

    /// A stored or submitted enum value that is not recognised.
    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },
}
