//! Per-tenant gateway config resolution and administration.

use chrono::{DateTime, Utc};
use common::{ConfigId, TenantId};
use domain::{FeePolicy, GatewayConfig, GatewayKind, PaymentMethod, PaymentOrder};
use payment_store::PaymentStore;
use serde::Serialize;

use crate::{EngineError, Result};

/// A gateway config without its secrets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub id: ConfigId,
    pub gateway: GatewayKind,
    pub key_id: String,
    pub is_test_mode: bool,
    pub is_active: bool,
    pub is_default: bool,
    pub supported_methods: Vec<PaymentMethod>,
    pub fee_policy: FeePolicy,
    pub display_name: Option<String>,
    pub has_webhook_secret: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&GatewayConfig> for ConfigSummary {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            id: config.id,
            gateway: config.gateway,
            key_id: config.key_id.clone(),
            is_test_mode: config.is_test_mode,
            is_active: config.is_active,
            is_default: config.is_default,
            supported_methods: config.supported_methods.clone(),
            fee_policy: config.fee_policy,
            display_name: config.display_name.clone(),
            has_webhook_secret: config.webhook_secret.is_some(),
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

/// Reads and writes tenants' gateway configs.
#[derive(Clone)]
pub struct GatewayConfigStore<S: PaymentStore> {
    store: S,
}

impl<S: PaymentStore> GatewayConfigStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Resolves the config to use for a tenant.
    ///
    /// Order of preference: the requested gateway if active, the tenant's
    /// active default, then any active config. Inactive configs are never
    /// returned.
    #[tracing::instrument(skip(self))]
    pub async fn get_config(
        &self,
        tenant_id: TenantId,
        gateway: Option<GatewayKind>,
    ) -> Result<Option<GatewayConfig>> {
        if let Some(gateway) = gateway
            && let Some(config) = self.store.find_config(tenant_id, gateway).await?
            && config.is_active
        {
            return Ok(Some(config));
        }

        let active: Vec<GatewayConfig> = self
            .store
            .list_configs(tenant_id)
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .collect();
        let default = active.iter().position(|c| c.is_default);
        Ok(match default {
            Some(index) => active.into_iter().nth(index),
            None => active.into_iter().next(),
        })
    }

    /// The active config an existing order was created under.
    pub async fn config_for_order(&self, order: &PaymentOrder) -> Result<GatewayConfig> {
        self.store
            .find_config(order.tenant_id, order.gateway)
            .await?
            .filter(|c| c.is_active)
            .ok_or(EngineError::GatewayNotConfigured(order.gateway))
    }

    /// Validates and stores a config. A default config displaces the
    /// tenant's previous default.
    #[tracing::instrument(skip(self, config), fields(tenant_id = %config.tenant_id, gateway = %config.gateway))]
    pub async fn save_config(&self, mut config: GatewayConfig) -> Result<ConfigSummary> {
        config.validate()?;
        config.updated_at = Utc::now();
        let stored = self.store.save_config(&config).await?;
        tracing::info!(config_id = %stored.id, is_default = stored.is_default, "gateway config saved");
        Ok(ConfigSummary::from(&stored))
    }

    /// Soft-disables a config. Orders created under it can no longer be
    /// verified or refunded until it is re-enabled.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_config(
        &self,
        tenant_id: TenantId,
        gateway: GatewayKind,
    ) -> Result<ConfigSummary> {
        let mut config = self
            .store
            .find_config(tenant_id, gateway)
            .await?
            .ok_or(EngineError::GatewayNotConfigured(gateway))?;
        config.is_active = false;
        config.is_default = false;
        config.updated_at = Utc::now();
        let stored = self.store.save_config(&config).await?;
        tracing::info!(config_id = %stored.id, "gateway config deactivated");
        Ok(ConfigSummary::from(&stored))
    }

    pub async fn list_configs(&self, tenant_id: TenantId) -> Result<Vec<ConfigSummary>> {
        Ok(self
            .store
            .list_configs(tenant_id)
            .await?
            .iter()
            .map(ConfigSummary::from)
            .collect())
    }
}
