//! Payment order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Currency, Money};
use domain::{GatewayKind, OrderStatus, PayerInfo, PaymentOrder};
use engine::{CheckoutOptions, CreateOrderRequest, OrderCreation, OrderDetails};
use payment_store::{OrderQuery, PaymentStore};
use serde::Deserialize;

use super::{AppState, Tenant};
use crate::error::ApiError;

const MAX_PAGE_SIZE: usize = 200;

/// Request body for creating a payment order.
#[derive(Deserialize)]
pub struct CreateOrderBody {
    /// Base amount in minor units.
    pub amount: i64,
    pub currency: Currency,
    pub purpose: String,
    #[serde(default)]
    pub description: Option<String>,
    pub payer: PayerInfo,
    #[serde(default)]
    pub gateway: Option<GatewayKind>,
    #[serde(default)]
    pub ledger_record_id: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

/// Query parameters for listing orders.
#[derive(Deserialize, Default)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub payer_user_id: Option<uuid::Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListOrdersParams {
    fn into_query(self) -> Result<OrderQuery, ApiError> {
        let mut query = OrderQuery::new().limit(self.limit.unwrap_or(50).min(MAX_PAGE_SIZE));
        if let Some(status) = self.status {
            query = query.status(status.parse::<OrderStatus>()?);
        }
        if let Some(from) = self.from {
            query = query.created_from(from);
        }
        if let Some(to) = self.to {
            query = query.created_before(to);
        }
        if let Some(user_id) = self.payer_user_id {
            query = query.payer_user_id(user_id);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

/// POST /payments/orders
///
/// Returns 201 with checkout options once the gateway has opened the order,
/// or 502 with the failed order when the gateway rejected it.
#[tracing::instrument(skip(state, body), fields(tenant_id = %tenant.0, purpose = %body.purpose))]
pub async fn create<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<OrderCreation>), ApiError> {
    let request = CreateOrderRequest {
        tenant_id: tenant.0,
        amount: Money::from_minor(body.amount),
        currency: body.currency,
        purpose: body.purpose,
        description: body.description,
        payer: body.payer,
        gateway: body.gateway,
        ledger_record_id: body.ledger_record_id,
        notes: body.notes,
    };

    let creation = state.engine.create_order(request).await?;
    let status = if creation.is_success() {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(creation)))
}

/// GET /payments/orders
#[tracing::instrument(skip(state, params), fields(tenant_id = %tenant.0))]
pub async fn list<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<PaymentOrder>>, ApiError> {
    let query = params.into_query()?;
    Ok(Json(state.engine.list_orders(tenant.0, &query).await?))
}

/// GET /payments/orders/{order_number}
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn get<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(order_number): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    Ok(Json(state.engine.get_order(tenant.0, &order_number).await?))
}

/// GET /payments/orders/{order_number}/checkout
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn checkout<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(order_number): Path<String>,
) -> Result<Json<CheckoutOptions>, ApiError> {
    Ok(Json(state.engine.checkout_options(tenant.0, &order_number).await?))
}

/// POST /payments/orders/{order_number}/cancel
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn cancel<S: PaymentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(order_number): Path<String>,
) -> Result<Json<PaymentOrder>, ApiError> {
    Ok(Json(state.engine.cancel_order(tenant.0, &order_number).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_cap_page_size() {
        let params = ListOrdersParams {
            limit: Some(10_000),
            ..Default::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.limit, Some(MAX_PAGE_SIZE));
    }

    #[test]
    fn test_list_params_parse_status() {
        let params = ListOrdersParams {
            status: Some("captured".to_string()),
            ..Default::default()
        };
        assert_eq!(params.into_query().unwrap().status, Some(OrderStatus::Captured));

        let bad = ListOrdersParams {
            status: Some("lost".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad.into_query(), Err(ApiError::BadRequest(_))));
    }
}
