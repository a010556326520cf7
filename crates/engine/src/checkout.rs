//! The secret-free bundle a client checkout widget is opened with.

use domain::{GatewayConfig, PaymentMethod, PaymentOrder};
use serde::Serialize;

use crate::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutPrefill {
    pub name: String,
    pub email: Option<String>,
    pub contact: Option<String>,
}

/// Which checkout methods the widget should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodFlags {
    pub card: bool,
    pub upi: bool,
    pub netbanking: bool,
    pub wallet: bool,
}

impl MethodFlags {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            card: config.supports(PaymentMethod::Card),
            upi: config.supports(PaymentMethod::Upi),
            netbanking: config.supports(PaymentMethod::Netbanking),
            wallet: config.supports(PaymentMethod::Wallet),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutOptions {
    /// Public API key. Never the key secret.
    pub key: String,
    pub order_id: String,
    /// Total amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub name: String,
    pub description: String,
    pub receipt: String,
    pub prefill: CheckoutPrefill,
    pub method: MethodFlags,
}

/// Builds checkout options for an order that has a remote order id.
pub fn build_checkout_options(
    order: &PaymentOrder,
    config: &GatewayConfig,
) -> Result<CheckoutOptions> {
    let order_id = order
        .gateway_order_id
        .clone()
        .ok_or_else(|| EngineError::OrderNotPayable {
            order_number: order.order_number.clone(),
            status: order.status,
        })?;

    Ok(CheckoutOptions {
        key: config.key_id.clone(),
        order_id,
        amount: order.total_amount.minor_units(),
        currency: order.currency.code().to_string(),
        name: config
            .display_name
            .clone()
            .unwrap_or_else(|| order.purpose.clone()),
        description: order
            .description
            .clone()
            .unwrap_or_else(|| order.purpose.clone()),
        receipt: order.order_number.clone(),
        prefill: CheckoutPrefill {
            name: order.payer.name.clone(),
            email: order.payer.email.clone(),
            contact: order.payer.phone.clone(),
        },
        method: MethodFlags::from_config(config),
    })
}
