//! Tenant gateway configuration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::Money;
use domain::{FeePolicy, GatewayConfig, GatewayKind, PaymentMethod};
use engine::ConfigSummary;
use payment_store::PaymentStore;
use serde::Deserialize;

use super::{AppState, Tenant};
use crate::error::ApiError;

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct SaveGatewayRequest {
    pub gateway: GatewayKind,
    pub key_id: String,
    pub key_secret: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub is_test_mode: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    /// Every method when absent.
    #[serde(default)]
    pub supported_methods: Option<Vec<PaymentMethod>>,
    #[serde(default)]
    pub convenience_fee_bps: u32,
    #[serde(default)]
    pub convenience_fee_fixed: i64,
    #[serde(default)]
    pub pass_fee_to_customer: bool,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SaveGatewayRequest {
    fn into_config(self, tenant: Tenant) -> GatewayConfig {
        let mut config = GatewayConfig::new(tenant.0, self.gateway, self.key_id, self.key_secret)
            .with_fee_policy(FeePolicy {
                percent_bps: self.convenience_fee_bps,
                fixed: Money::from_minor(self.convenience_fee_fixed),
                pass_to_customer: self.pass_fee_to_customer,
            });
        if let Some(secret) = self.webhook_secret {
            config = config.with_webhook_secret(secret);
        }
        if let Some(methods) = self.supported_methods {
            config = config.with_methods(methods);
        }
        if let Some(name) = self.display_name {
            config = config.with_display_name(name);
        }
        if self.is_default {
            config = config.as_default();
        }
        if self.is_test_mode {
            config = config.test_mode();
        }
        config.is_active = self.is_active;
        config
    }
}

/// PUT /payments/gateways: create or replace the tenant's config for a gateway.
#[tracing::instrument(skip(state, req), fields(tenant_id = %tenant.0))]
pub async fn save<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Json(req): Json<SaveGatewayRequest>,
) -> Result<Json<ConfigSummary>, ApiError> {
    let summary = state.engine.save_config(req.into_config(tenant)).await?;
    Ok(Json(summary))
}

/// GET /payments/gateways: the tenant's configs, without secrets.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn list<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
) -> Result<Json<Vec<ConfigSummary>>, ApiError> {
    Ok(Json(state.engine.list_configs(tenant.0).await?))
}

/// DELETE /payments/gateways/{gateway}: soft-disable a config.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn deactivate<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(gateway): Path<String>,
) -> Result<Json<ConfigSummary>, ApiError> {
    let gateway: GatewayKind = gateway.parse()?;
    Ok(Json(state.engine.deactivate_config(tenant.0, gateway).await?))
}
