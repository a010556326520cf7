use std::time::Duration;

use secrecy::SecretString;

/// Bounds for a single gateway call.
pub const MIN_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a new order stays payable.
    pub order_ttl: chrono::Duration,
    /// Upper bound on each gateway call.
    pub gateway_timeout: Duration,
    /// Prefix of generated order numbers.
    pub order_number_prefix: String,
    /// Attempts at a unique order number before giving up.
    pub order_number_attempts: u32,
    /// Receipt links are `{base}/{order_number}` when set.
    pub receipt_base_url: Option<String>,
    /// Webhook secret used when the tenant's config carries none.
    pub webhook_secret: Option<SecretString>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_ttl: chrono::Duration::hours(24),
            gateway_timeout: Duration::from_secs(20),
            order_number_prefix: "PAY".to_string(),
            order_number_attempts: 3,
            receipt_base_url: None,
            webhook_secret: None,
        }
    }
}

impl EngineConfig {
    /// Sets the gateway timeout, clamped to 10-30 seconds.
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout.clamp(MIN_GATEWAY_TIMEOUT, MAX_GATEWAY_TIMEOUT);
        self
    }

    pub fn with_order_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.order_ttl = ttl;
        self
    }

    pub fn with_receipt_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.receipt_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn receipt_url(&self, order_number: &str) -> Option<String> {
        self.receipt_base_url
            .as_ref()
            .map(|base| format!("{base}/{order_number}"))
    }
}
