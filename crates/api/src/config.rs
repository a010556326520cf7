//! Application configuration loaded from environment variables.

use std::time::Duration;

use engine::EngineConfig;
use secrecy::SecretString;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `"0.0.0.0"`) and `PORT` (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL store when set, in-memory store otherwise
/// - `RAZORPAY_BASE_URL`: gateway API root
/// - `GATEWAY_TIMEOUT_SECS`: per-call gateway timeout, clamped to 10-30 (default 20)
/// - `ORDER_TTL_HOURS`: how long new orders stay payable (default 24)
/// - `EXPIRY_SWEEP_INTERVAL_SECS`: stale order sweep period (default 300)
/// - `PAYMENT_WEBHOOK_SECRET`: webhook secret for tenants without their own
/// - `RECEIPT_BASE_URL`: receipt links are `{base}/{order_number}` when set
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub razorpay_base_url: String,
    pub gateway_timeout: Duration,
    pub order_ttl_hours: i64,
    pub expiry_sweep_interval: Duration,
    pub webhook_secret: Option<SecretString>,
    pub receipt_base_url: Option<String>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|v| v.parse().ok())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: var("DATABASE_URL"),
            razorpay_base_url: var("RAZORPAY_BASE_URL").unwrap_or(defaults.razorpay_base_url),
            gateway_timeout: parsed("GATEWAY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.gateway_timeout),
            order_ttl_hours: parsed("ORDER_TTL_HOURS").unwrap_or(defaults.order_ttl_hours),
            expiry_sweep_interval: parsed("EXPIRY_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.expiry_sweep_interval),
            webhook_secret: var("PAYMENT_WEBHOOK_SECRET").map(SecretString::from),
            receipt_base_url: var("RECEIPT_BASE_URL"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .with_gateway_timeout(self.gateway_timeout)
            .with_order_ttl(chrono::Duration::hours(self.order_ttl_hours.max(1)));
        if let Some(base) = &self.receipt_base_url {
            config = config.with_receipt_base_url(base.clone());
        }
        config.webhook_secret = self.webhook_secret.clone();
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            razorpay_base_url: gateway::razorpay::DEFAULT_BASE_URL.to_string(),
            gateway_timeout: Duration::from_secs(20),
            order_ttl_hours: 24,
            expiry_sweep_interval: Duration::from_secs(300),
            webhook_secret: None,
            receipt_base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.gateway_timeout, Duration::from_secs(20));
        assert_eq!(config.expiry_sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_engine_config_clamps_timeout() {
        let config = Config {
            gateway_timeout: Duration::from_secs(90),
            order_ttl_hours: 2,
            receipt_base_url: Some("https://school.test/r".to_string()),
            ..Config::default()
        };
        let engine = config.engine_config();
        assert_eq!(engine.gateway_timeout, Duration::from_secs(30));
        assert_eq!(engine.order_ttl, chrono::Duration::hours(2));
        assert_eq!(
            engine.receipt_url("PAY1").as_deref(),
            Some("https://school.test/r/PAY1")
        );
    }
}
