//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use engine::EngineError;
use payment_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Payment engine rejection.
    Engine(EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Engine(err) => engine_error_to_response(err),
        };
        if status.is_server_error() {
            tracing::error!(%code, error = %message, "request failed");
        }
        metrics::counter!("payment_api_errors_total", "code" => code).increment(1);

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, &'static str, String) {
    let (status, code) = match &err {
        EngineError::NoGatewayConfigured(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "NO_GATEWAY_CONFIGURED")
        }
        EngineError::GatewayNotConfigured(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "GATEWAY_NOT_CONFIGURED")
        }
        EngineError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        EngineError::TransactionNotFound(_) => (StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND"),
        EngineError::NotificationNotFound(_) => (StatusCode::NOT_FOUND, "NOTIFICATION_NOT_FOUND"),
        EngineError::OrderExpired(_) => (StatusCode::GONE, "ORDER_EXPIRED"),
        EngineError::OrderNotPayable { .. } => (StatusCode::CONFLICT, "ORDER_NOT_PAYABLE"),
        EngineError::TransactionNotRefundable(_) => {
            (StatusCode::CONFLICT, "TRANSACTION_NOT_REFUNDABLE")
        }
        EngineError::RefundExceedsBalance { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "REFUND_EXCEEDS_BALANCE")
        }
        EngineError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        EngineError::Domain(DomainError::InvalidTransition { .. }) => {
            (StatusCode::CONFLICT, "INVALID_TRANSITION")
        }
        EngineError::Domain(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        EngineError::Store(StoreError::ConcurrencyConflict { .. } | StoreError::Duplicate { .. }) => {
            (StatusCode::CONFLICT, "CONFLICT")
        }
        EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        EngineError::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
    };
    (status, code, err.to_string())
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;

    fn status_of(err: EngineError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_engine_errors_map_to_statuses() {
        assert_eq!(
            status_of(EngineError::OrderNotFound("PAY1".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::OrderExpired("PAY1".to_string())),
            StatusCode::GONE
        );
        assert_eq!(
            status_of(EngineError::RefundExceedsBalance {
                requested: Money::from_minor(10),
                available: Money::zero(),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(EngineError::Gateway(gateway::GatewayError::Timeout)),
            StatusCode::BAD_GATEWAY
        );
    }
}
