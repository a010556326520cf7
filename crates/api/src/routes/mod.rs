//! HTTP handlers and the state they share.

pub mod gateways;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod stats;
pub mod webhooks;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::TenantId;
use engine::PaymentEngine;
use payment_store::PaymentStore;

use crate::error::ApiError;

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S: PaymentStore> {
    pub engine: PaymentEngine<S>,
}

/// The tenant a request acts for, taken from `X-Tenant-Id`.
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .ok_or_else(|| ApiError::BadRequest("Missing X-Tenant-Id header".to_string()))?;
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<TenantId>().ok())
            .map(Tenant)
            .ok_or_else(|| ApiError::BadRequest("Invalid X-Tenant-Id header".to_string()))
    }
}
