//! Per-tenant gateway configuration and fee policy.

use chrono::{DateTime, Utc};
use common::{ConfigId, Money, TenantId};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Payment providers the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Razorpay,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Razorpay => "razorpay",
        }
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "razorpay" => Ok(GatewayKind::Razorpay),
            _ => Err(DomainError::UnknownValue {
                kind: "gateway",
                value: s.to_string(),
            }),
        }
    }
}

/// Checkout methods a gateway config can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Upi,
    Netbanking,
    Wallet,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Card,
        PaymentMethod::Upi,
        PaymentMethod::Netbanking,
        PaymentMethod::Wallet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "payment method",
                value: s.to_string(),
            })
    }
}

/// Convenience fee: a percentage (basis points) plus a fixed amount.
///
/// When `pass_to_customer` is false the institution absorbs the fee and the
/// payer is charged the base amount only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Percentage in basis points (200 = 2%).
    pub percent_bps: u32,
    pub fixed: Money,
    pub pass_to_customer: bool,
}

impl FeePolicy {
    /// A policy that charges the payer nothing extra.
    pub fn absorbed() -> Self {
        Self::default()
    }

    /// A policy passed on to the payer.
    pub fn passed_to_customer(percent_bps: u32, fixed: Money) -> Self {
        Self {
            percent_bps,
            fixed,
            pass_to_customer: true,
        }
    }

    /// Fee charged to the payer on top of `amount`.
    pub fn convenience_fee(&self, amount: Money) -> Money {
        if !self.pass_to_customer {
            return Money::zero();
        }
        amount.percent_bps(self.percent_bps) + self.fixed
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.percent_bps > 10_000 {
            return Err(DomainError::InvalidFeePolicy(format!(
                "percentage {} bps exceeds 100%",
                self.percent_bps
            )));
        }
        if self.fixed.is_negative() {
            return Err(DomainError::InvalidFeePolicy(format!(
                "fixed fee {} is negative",
                self.fixed
            )));
        }
        Ok(())
    }
}

/// Credentials and policy for one gateway of one tenant.
///
/// Never hard-deleted while orders reference it: disable with `is_active = false`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub id: ConfigId,
    pub tenant_id: TenantId,
    pub gateway: GatewayKind,
    /// Public key id, safe to hand to the checkout widget.
    pub key_id: String,
    pub key_secret: SecretString,
    pub webhook_secret: Option<SecretString>,
    pub is_test_mode: bool,
    pub is_active: bool,
    pub is_default: bool,
    pub supported_methods: Vec<PaymentMethod>,
    pub fee_policy: FeePolicy,
    /// Merchant name shown in the checkout widget.
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GatewayConfig {
    /// Creates an active, non-default config supporting every method with no fee.
    pub fn new(
        tenant_id: TenantId,
        gateway: GatewayKind,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConfigId::new(),
            tenant_id,
            gateway,
            key_id: key_id.into(),
            key_secret: SecretString::from(key_secret.into()),
            webhook_secret: None,
            is_test_mode: false,
            is_active: true,
            is_default: false,
            supported_methods: PaymentMethod::ALL.to_vec(),
            fee_policy: FeePolicy::absorbed(),
            display_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn with_fee_policy(mut self, fee_policy: FeePolicy) -> Self {
        self.fee_policy = fee_policy;
        self
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = PaymentMethod>) -> Self {
        self.supported_methods = methods.into_iter().collect();
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn test_mode(mut self) -> Self {
        self.is_test_mode = true;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn supports(&self, method: PaymentMethod) -> bool {
        self.supported_methods.contains(&method)
    }

    /// Checks the fields a config must carry before it is stored.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.key_id.trim().is_empty() {
            return Err(DomainError::InvalidConfig("key id is empty".to_string()));
        }
        self.fee_policy.validate()
    }
}
