//! Raw gateway webhook log entry.

use chrono::{DateTime, Utc};
use common::{NotificationId, OrderId, TenantId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::gateway_config::GatewayKind;

/// Append-only record of one webhook delivery.
///
/// Written once on receipt. The only later mutation is the processed flag set
/// by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub id: NotificationId,
    /// Known when the delivery could be attributed to a tenant.
    pub tenant_id: Option<TenantId>,
    pub gateway: GatewayKind,
    /// Provider delivery id used to de-duplicate retries.
    pub event_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub headers: serde_json::Value,
    pub signature: Option<String>,
    pub signature_valid: bool,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub order_id: Option<OrderId>,
    pub transaction_id: Option<TransactionId>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentNotification {
    /// Records a delivery as received. Unverified deliveries are closed
    /// immediately so reconciliation never trusts them.
    pub fn received(
        gateway: GatewayKind,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        headers: serde_json::Value,
        signature: Option<String>,
        signature_valid: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let mut notification = Self {
            id: NotificationId::new(),
            tenant_id: None,
            gateway,
            event_id: None,
            event_type: event_type.into(),
            payload,
            headers,
            signature,
            signature_valid,
            processed: false,
            processing_error: None,
            order_id: None,
            transaction_id: None,
            received_at: now,
            processed_at: None,
        };
        if !signature_valid {
            notification.mark_processed(Some("signature verification failed".to_string()), now);
        }
        notification
    }

    pub fn mark_processed(&mut self, error: Option<String>, now: DateTime<Utc>) {
        self.processed = true;
        self.processing_error = error;
        self.processed_at = Some(now);
    }
}
