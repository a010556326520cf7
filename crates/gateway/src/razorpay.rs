//! Razorpay REST adapter.

use std::time::Duration;

use async_trait::async_trait;
use common::{Currency, Money};
use domain::GatewayKind;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::{
    GatewayAdapter, GatewayCredentials, GatewayError, RemoteOrder, RemoteOrderRequest,
    RemotePayment, RemotePaymentStatus, RemoteRefund, WebhookSummary,
};

pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";

/// Error bodies are truncated before they are stored.
const MAX_ERROR_MESSAGE: usize = 200;

pub struct RazorpayAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl RazorpayAdapter {
    /// Creates an adapter whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn send(
        &self,
        credentials: &GatewayCredentials,
        request: RequestBuilder,
    ) -> Result<Value, GatewayError> {
        let response = request
            .basic_auth(
                &credentials.key_id,
                Some(credentials.key_secret.expose_secret()),
            )
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        let (code, message) = error_details(&body);
        tracing::debug!(status = status.as_u16(), %message, "razorpay request failed");
        Err(if status == StatusCode::REQUEST_TIMEOUT {
            GatewayError::Timeout
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            GatewayError::Unavailable {
                status: status.as_u16(),
                message,
            }
        } else {
            GatewayError::Rejected {
                status: status.as_u16(),
                code: code.unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
                message,
            }
        })
    }
}

/// Pulls `error.code` and `error.description` out of a Razorpay error body,
/// falling back to the raw text.
fn error_details(body: &str) -> (Option<String>, String) {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let code = error.and_then(|e| str_field(e, "code"));
    let message = error
        .and_then(|e| str_field(e, "description"))
        .unwrap_or_else(|| body.to_string());
    (code, message.chars().take(MAX_ERROR_MESSAGE).collect())
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToString::to_string)
}

fn require_id(raw: &Value, what: &str) -> Result<String, GatewayError> {
    str_field(raw, "id").ok_or_else(|| GatewayError::InvalidResponse(format!("{what} without id")))
}

fn parse_payment(raw: Value) -> Result<RemotePayment, GatewayError> {
    let id = require_id(&raw, "payment")?;
    let provider_status = str_field(&raw, "status")
        .ok_or_else(|| GatewayError::InvalidResponse("payment without status".to_string()))?;

    Ok(RemotePayment {
        id,
        status: RemotePaymentStatus::from_provider(&provider_status),
        provider_status,
        method: str_field(&raw, "method"),
        amount: raw.get("amount").and_then(Value::as_i64).map(Money::from_minor),
        order_id: str_field(&raw, "order_id"),
        error_code: str_field(&raw, "error_code"),
        error_description: str_field(&raw, "error_description"),
        raw,
    })
}

#[async_trait]
impl GatewayAdapter for RazorpayAdapter {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    #[tracing::instrument(skip(self, credentials, request), fields(receipt = %request.receipt))]
    async fn create_remote_order(
        &self,
        credentials: &GatewayCredentials,
        request: RemoteOrderRequest,
    ) -> Result<RemoteOrder, GatewayError> {
        let body = json!({
            "amount": request.amount.minor_units(),
            "currency": request.currency.code(),
            "receipt": request.receipt,
            "notes": request.notes,
            "payment_capture": 1,
        });
        let raw = self
            .send(credentials, self.client.post(self.url("orders")).json(&body))
            .await?;
        Ok(RemoteOrder {
            id: require_id(&raw, "order")?,
            raw,
        })
    }

    #[tracing::instrument(skip(self, credentials))]
    async fn fetch_payment(
        &self,
        credentials: &GatewayCredentials,
        payment_id: &str,
    ) -> Result<RemotePayment, GatewayError> {
        let raw = self
            .send(
                credentials,
                self.client.get(self.url(&format!("payments/{payment_id}"))),
            )
            .await?;
        parse_payment(raw)
    }

    #[tracing::instrument(skip(self, credentials))]
    async fn capture_payment(
        &self,
        credentials: &GatewayCredentials,
        payment_id: &str,
        amount: Money,
        currency: Currency,
    ) -> Result<RemotePayment, GatewayError> {
        let body = json!({
            "amount": amount.minor_units(),
            "currency": currency.code(),
        });
        let raw = self
            .send(
                credentials,
                self.client
                    .post(self.url(&format!("payments/{payment_id}/capture")))
                    .json(&body),
            )
            .await?;
        parse_payment(raw)
    }

    #[tracing::instrument(skip(self, credentials))]
    async fn refund(
        &self,
        credentials: &GatewayCredentials,
        payment_id: &str,
        amount: Option<Money>,
    ) -> Result<RemoteRefund, GatewayError> {
        let body = match amount {
            Some(amount) => json!({ "amount": amount.minor_units() }),
            None => json!({}),
        };
        let raw = self
            .send(
                credentials,
                self.client
                    .post(self.url(&format!("payments/{payment_id}/refund")))
                    .json(&body),
            )
            .await?;
        Ok(RemoteRefund {
            id: require_id(&raw, "refund")?,
            raw,
        })
    }

    fn webhook_signature_header(&self) -> &'static str {
        "x-razorpay-signature"
    }

    fn webhook_event_id_header(&self) -> Option<&'static str> {
        Some("x-razorpay-event-id")
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookSummary, GatewayError> {
        parse_webhook_body(body)
    }
}

/// Reads a Razorpay event body. Payment events carry the payment entity,
/// `order.paid` carries the order and refund events carry the refund.
pub(crate) fn parse_webhook_body(body: &[u8]) -> Result<WebhookSummary, GatewayError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    let event_type = str_field(&value, "event")
        .ok_or_else(|| GatewayError::InvalidResponse("webhook without event".to_string()))?;

    let entity = |name: &str| value.pointer(&format!("/payload/{name}/entity"));
    let payment = entity("payment");
    let payment_id = payment
        .and_then(|p| str_field(p, "id"))
        .or_else(|| entity("refund").and_then(|r| str_field(r, "payment_id")));
    let order_id = payment
        .and_then(|p| str_field(p, "order_id"))
        .or_else(|| entity("order").and_then(|o| str_field(o, "id")));

    Ok(WebhookSummary {
        event_type,
        order_id,
        payment_id,
    })
}
