use async_trait::async_trait;
use common::{Currency, Money};
use domain::{GatewayConfig, GatewayKind};
use secrecy::{ExposeSecret, SecretString};

use crate::{GatewayError, signature};

/// Credentials an adapter authenticates with for one tenant.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub key_id: String,
    pub key_secret: SecretString,
    pub test_mode: bool,
}

impl From<&GatewayConfig> for GatewayCredentials {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            test_mode: config.is_test_mode,
        }
    }
}

/// Request to open an order on the provider.
#[derive(Debug, Clone)]
pub struct RemoteOrderRequest {
    pub amount: Money,
    pub currency: Currency,
    /// Our order number, echoed back by the provider.
    pub receipt: String,
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RemoteOrder {
    pub id: String,
    pub raw: serde_json::Value,
}

/// Provider-side state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePaymentStatus {
    Captured,
    Authorized,
    /// Anything else the provider reports (created, failed, refunded, ...).
    Failed,
}

impl RemotePaymentStatus {
    pub fn from_provider(status: &str) -> Self {
        match status {
            "captured" => RemotePaymentStatus::Captured,
            "authorized" => RemotePaymentStatus::Authorized,
            _ => RemotePaymentStatus::Failed,
        }
    }
}

/// The fields of a provider payment the engine acts on. The full body is
/// kept in `raw` for audit only.
#[derive(Debug, Clone)]
pub struct RemotePayment {
    pub id: String,
    pub status: RemotePaymentStatus,
    /// Status text as the provider sent it.
    pub provider_status: String,
    pub method: Option<String>,
    pub amount: Option<Money>,
    pub order_id: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RemoteRefund {
    pub id: String,
    pub raw: serde_json::Value,
}

/// Identifiers pulled out of a webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookSummary {
    pub event_type: String,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
}

/// One payment provider.
///
/// Implementations must be cheap to share (`Arc<dyn GatewayAdapter>`) and must
/// surface timeouts as [`GatewayError::Timeout`], never as success.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Opens an order for `request.amount` minor units.
    async fn create_remote_order(
        &self,
        credentials: &GatewayCredentials,
        request: RemoteOrderRequest,
    ) -> Result<RemoteOrder, GatewayError>;

    /// Fetches the authoritative state of a payment.
    async fn fetch_payment(
        &self,
        credentials: &GatewayCredentials,
        payment_id: &str,
    ) -> Result<RemotePayment, GatewayError>;

    /// Captures an authorized payment.
    async fn capture_payment(
        &self,
        credentials: &GatewayCredentials,
        payment_id: &str,
        amount: Money,
        currency: Currency,
    ) -> Result<RemotePayment, GatewayError>;

    /// Refunds a payment. `None` refunds the full amount.
    async fn refund(
        &self,
        credentials: &GatewayCredentials,
        payment_id: &str,
        amount: Option<Money>,
    ) -> Result<RemoteRefund, GatewayError>;

    /// Verifies the checkout callback signature over `"{order_id}|{payment_id}"`.
    fn verify_signature(
        &self,
        credentials: &GatewayCredentials,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> bool {
        signature::verify_hex(
            credentials.key_secret.expose_secret().as_bytes(),
            signature::payment_message(order_id, payment_id).as_bytes(),
            signature,
        )
    }

    /// Verifies a webhook signature over the raw request body.
    fn verify_webhook_signature(
        &self,
        body: &[u8],
        signature: &str,
        webhook_secret: &SecretString,
    ) -> bool {
        signature::verify_hex(webhook_secret.expose_secret().as_bytes(), body, signature)
    }

    /// Header carrying the webhook signature (lowercase).
    fn webhook_signature_header(&self) -> &'static str;

    /// Header carrying the provider's delivery id, if the provider sends one.
    fn webhook_event_id_header(&self) -> Option<&'static str> {
        None
    }

    /// Extracts the event type and referenced ids from a webhook body.
    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookSummary, GatewayError>;
}
