//! Status state machines for orders, transactions and refunds.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Outcome of a permitted status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status moved forward.
    Changed,
    /// The status already had the requested value; nothing to write.
    Unchanged,
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        matches!(self, Transition::Changed)
    }
}

/// The status of a payment order.
///
/// State transitions:
/// ```text
/// Created ──► Pending ──► (Authorized ──►) Captured ──► PartiallyRefunded ──► Refunded
///    │           │             │               └───────────────────────────────▲
///    └───────────┴─────────────┴──► Failed | Expired | Cancelled
/// ```
/// Authorized does not expire; it can only be captured, failed or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Row persisted, remote order not yet opened.
    #[default]
    Created,

    /// Remote order opened, awaiting the payer.
    Pending,

    /// Funds authorized at the gateway, not yet captured.
    Authorized,

    /// Money has moved.
    Captured,

    /// Part of the captured amount was refunded.
    PartiallyRefunded,

    /// The full captured amount was refunded (terminal).
    Refunded,

    /// Remote order creation or payment failed (terminal).
    Failed,

    /// Not paid before `expires_at` (terminal).
    Expired,

    /// Withdrawn before payment (terminal).
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Created,
        OrderStatus::Pending,
        OrderStatus::Authorized,
        OrderStatus::Captured,
        OrderStatus::PartiallyRefunded,
        OrderStatus::Refunded,
        OrderStatus::Failed,
        OrderStatus::Expired,
        OrderStatus::Cancelled,
    ];

    /// Returns true if `next` is a forward move from this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Pending | Failed | Expired | Cancelled)
                | (Pending, Authorized | Captured | Failed | Expired | Cancelled)
                | (Authorized, Captured | Failed | Cancelled)
                | (Captured, PartiallyRefunded | Refunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    /// Validates a move to `next`. Same-status moves are no-ops, regressions are errors.
    pub fn transition(&self, next: OrderStatus) -> Result<Transition, DomainError> {
        if *self == next {
            return Ok(Transition::Unchanged);
        }
        if self.can_transition_to(next) {
            Ok(Transition::Changed)
        } else {
            Err(DomainError::InvalidTransition {
                entity: "order",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Returns true before any money has moved.
    pub fn is_pre_capture(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::Pending | OrderStatus::Authorized
        )
    }

    /// Returns true for the statuses the expiry rule applies to.
    pub fn is_expirable(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::Pending)
    }

    /// Returns true once the order has been captured (including refunds after capture).
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Captured | OrderStatus::PartiallyRefunded | OrderStatus::Refunded
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Refunded
                | OrderStatus::Failed
                | OrderStatus::Expired
                | OrderStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Authorized => "AUTHORIZED",
            OrderStatus::Captured => "CAPTURED",
            OrderStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// The status of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Authorized,
    Captured,
    PartiallyRefunded,
    Refunded,
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 6] = [
        TransactionStatus::Pending,
        TransactionStatus::Authorized,
        TransactionStatus::Captured,
        TransactionStatus::PartiallyRefunded,
        TransactionStatus::Refunded,
        TransactionStatus::Failed,
    ];

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized | Captured | Failed)
                | (Authorized, Captured | Failed)
                | (Captured, PartiallyRefunded | Refunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    pub fn transition(&self, next: TransactionStatus) -> Result<Transition, DomainError> {
        if *self == next {
            return Ok(Transition::Unchanged);
        }
        if self.can_transition_to(next) {
            Ok(Transition::Changed)
        } else {
            Err(DomainError::InvalidTransition {
                entity: "transaction",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Returns true if a refund may be issued against this transaction.
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Captured | TransactionStatus::PartiallyRefunded
        )
    }

    /// Returns true if the attempt reached a final outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Captured | TransactionStatus::Failed | TransactionStatus::Refunded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Authorized => "AUTHORIZED",
            TransactionStatus::Captured => "CAPTURED",
            TransactionStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            TransactionStatus::Refunded => "REFUNDED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "transaction status",
                value: s.to_string(),
            })
    }
}

/// The status of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn transition(&self, next: RefundStatus) -> Result<Transition, DomainError> {
        match (self, next) {
            (a, b) if *a == b => Ok(Transition::Unchanged),
            (RefundStatus::Pending, RefundStatus::Completed | RefundStatus::Failed) => {
                Ok(Transition::Changed)
            }
            _ => Err(DomainError::InvalidTransition {
                entity: "refund",
                from: self.as_str(),
                to: next.as_str(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "PENDING",
            RefundStatus::Completed => "COMPLETED",
            RefundStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(RefundStatus::Pending),
            "COMPLETED" => Ok(RefundStatus::Completed),
            "FAILED" => Ok(RefundStatus::Failed),
            _ => Err(DomainError::UnknownValue {
                kind: "refund status",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_status_is_created() {
        assert_eq!(OrderStatus::default(), OrderStatus::Created);
    }

    #[test]
    fn happy_path_moves_forward() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Captured));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Authorized));
        assert!(OrderStatus::Authorized.can_transition_to(OrderStatus::Captured));
        assert!(OrderStatus::Captured.can_transition_to(OrderStatus::PartiallyRefunded));
        assert!(OrderStatus::PartiallyRefunded.can_transition_to(OrderStatus::Refunded));
        assert!(OrderStatus::Captured.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn order_status_never_regresses() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if from.is_paid() && !to.is_paid() {
                    assert!(
                        from.transition(to).is_err(),
                        "{from} -> {to} must be rejected"
                    );
                }
            }
        }
        assert!(OrderStatus::Captured.transition(OrderStatus::Pending).is_err());
        assert!(OrderStatus::Refunded
            .transition(OrderStatus::PartiallyRefunded)
            .is_err());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn same_status_is_a_no_op() {
        assert_eq!(
            OrderStatus::Captured.transition(OrderStatus::Captured).unwrap(),
            Transition::Unchanged
        );
        assert_eq!(
            OrderStatus::Expired.transition(OrderStatus::Expired).unwrap(),
            Transition::Unchanged
        );
    }

    #[test]
    fn off_ramps_only_before_capture() {
        for from in [OrderStatus::Created, OrderStatus::Pending] {
            assert!(from.can_transition_to(OrderStatus::Expired));
            assert!(from.can_transition_to(OrderStatus::Cancelled));
            assert!(from.can_transition_to(OrderStatus::Failed));
        }
        assert!(!OrderStatus::Authorized.can_transition_to(OrderStatus::Expired));
        assert!(!OrderStatus::Captured.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Captured.can_transition_to(OrderStatus::Failed));
    }

    #[test]
    fn transaction_refund_path() {
        assert!(TransactionStatus::Captured.is_refundable());
        assert!(TransactionStatus::PartiallyRefunded.is_refundable());
        assert!(!TransactionStatus::Pending.is_refundable());
        assert!(!TransactionStatus::Refunded.is_refundable());
        assert!(TransactionStatus::Failed
            .transition(TransactionStatus::Captured)
            .is_err());
    }

    #[test]
    fn refund_is_final_once_completed_or_failed() {
        assert!(RefundStatus::Pending.transition(RefundStatus::Completed).is_ok());
        assert!(RefundStatus::Completed.transition(RefundStatus::Failed).is_err());
        assert!(RefundStatus::Failed.transition(RefundStatus::Completed).is_err());
    }

    #[test]
    fn status_string_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        for status in TransactionStatus::ALL {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("BOGUS".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PartiallyRefunded).unwrap();
        assert_eq!(json, "\"PARTIALLY_REFUNDED\"");
    }
}
