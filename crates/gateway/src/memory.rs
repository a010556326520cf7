//! Scriptable gateway for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{Currency, Money};
use domain::GatewayKind;
use serde_json::json;

use crate::{
    GatewayAdapter, GatewayCredentials, GatewayError, RemoteOrder, RemoteOrderRequest,
    RemotePayment, RemotePaymentStatus, RemoteRefund, WebhookSummary, razorpay,
};

#[derive(Debug, Clone)]
struct FakePayment {
    order_id: String,
    status: String,
    method: String,
    amount: Money,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    orders: HashMap<String, (Money, Currency)>,
    payments: HashMap<String, FakePayment>,
    refunds: Vec<(String, Option<Money>)>,
    next_id: u32,
    fail_next_order: Option<GatewayError>,
    fail_next_fetch: Option<GatewayError>,
    fail_next_refund: Option<GatewayError>,
    delay: Option<Duration>,
    order_calls: usize,
    fetch_calls: usize,
    capture_calls: usize,
    refund_calls: usize,
}

/// In-memory gateway that speaks Razorpay's conventions (ids, statuses,
/// webhook headers and body shape) without a network.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `create_remote_order` call fail with `error`.
    pub fn fail_next_order(&self, error: GatewayError) {
        self.state().fail_next_order = Some(error);
    }

    /// Makes the next `fetch_payment` call fail with `error`.
    pub fn fail_next_fetch(&self, error: GatewayError) {
        self.state().fail_next_fetch = Some(error);
    }

    /// Makes the next `refund` call fail with `error`.
    pub fn fail_next_refund(&self, error: GatewayError) {
        self.state().fail_next_refund = Some(error);
    }

    /// Delays every call, for exercising caller-side timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Simulates the payer finishing checkout: registers a payment against a
    /// remote order with the provider `status` and returns its id.
    pub fn complete_checkout(&self, order_id: &str, status: &str, method: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let payment_id = format!("pay_{:06}", state.next_id);
        let amount = state
            .orders
            .get(order_id)
            .map(|(amount, _)| *amount)
            .unwrap_or_default();
        state.payments.insert(
            payment_id.clone(),
            FakePayment {
                order_id: order_id.to_string(),
                status: status.to_string(),
                method: method.to_string(),
                amount,
            },
        );
        payment_id
    }

    /// Overrides the amount the provider reports for a payment.
    pub fn set_payment_amount(&self, payment_id: &str, amount: Money) {
        if let Some(payment) = self.state().payments.get_mut(payment_id) {
            payment.amount = amount;
        }
    }

    pub fn order_calls(&self) -> usize {
        self.state().order_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.state().fetch_calls
    }

    pub fn capture_calls(&self) -> usize {
        self.state().capture_calls
    }

    pub fn refund_calls(&self) -> usize {
        self.state().refund_calls
    }

    /// Refunds issued so far as `(payment id, amount)`.
    pub fn refunds(&self) -> Vec<(String, Option<Money>)> {
        self.state().refunds.clone()
    }

    async fn pause(&self) {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn to_remote(payment_id: &str, payment: &FakePayment) -> RemotePayment {
        RemotePayment {
            id: payment_id.to_string(),
            status: RemotePaymentStatus::from_provider(&payment.status),
            provider_status: payment.status.clone(),
            method: Some(payment.method.clone()),
            amount: Some(payment.amount),
            order_id: Some(payment.order_id.clone()),
            error_code: None,
            error_description: None,
            raw: json!({
                "id": payment_id,
                "entity": "payment",
                "status": payment.status,
                "method": payment.method,
                "amount": payment.amount.minor_units(),
                "order_id": payment.order_id,
            }),
        }
    }
}

fn not_found(what: &str, id: &str) -> GatewayError {
    GatewayError::Rejected {
        status: 400,
        code: "BAD_REQUEST_ERROR".to_string(),
        message: format!("{what} {id} does not exist"),
    }
}

#[async_trait]
impl GatewayAdapter for InMemoryGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    async fn create_remote_order(
        &self,
        _credentials: &GatewayCredentials,
        request: RemoteOrderRequest,
    ) -> Result<RemoteOrder, GatewayError> {
        self.pause().await;
        let mut state = self.state();
        state.order_calls += 1;
        if let Some(error) = state.fail_next_order.take() {
            return Err(error);
        }
        state.next_id += 1;
        let id = format!("order_{:06}", state.next_id);
        state
            .orders
            .insert(id.clone(), (request.amount, request.currency));
        Ok(RemoteOrder {
            raw: json!({
                "id": id,
                "entity": "order",
                "amount": request.amount.minor_units(),
                "currency": request.currency.code(),
                "receipt": request.receipt,
                "status": "created",
            }),
            id,
        })
    }

    async fn fetch_payment(
        &self,
        _credentials: &GatewayCredentials,
        payment_id: &str,
    ) -> Result<RemotePayment, GatewayError> {
        self.pause().await;
        let mut state = self.state();
        state.fetch_calls += 1;
        if let Some(error) = state.fail_next_fetch.take() {
            return Err(error);
        }
        state
            .payments
            .get(payment_id)
            .map(|p| Self::to_remote(payment_id, p))
            .ok_or_else(|| not_found("payment", payment_id))
    }

    async fn capture_payment(
        &self,
        _credentials: &GatewayCredentials,
        payment_id: &str,
        amount: Money,
        _currency: Currency,
    ) -> Result<RemotePayment, GatewayError> {
        self.pause().await;
        let mut state = self.state();
        state.capture_calls += 1;
        let payment = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| not_found("payment", payment_id))?;
        if payment.status != "authorized" || payment.amount != amount {
            return Err(GatewayError::Rejected {
                status: 400,
                code: "BAD_REQUEST_ERROR".to_string(),
                message: format!("payment {payment_id} cannot be captured"),
            });
        }
        payment.status = "captured".to_string();
        Ok(Self::to_remote(payment_id, payment))
    }

    async fn refund(
        &self,
        _credentials: &GatewayCredentials,
        payment_id: &str,
        amount: Option<Money>,
    ) -> Result<RemoteRefund, GatewayError> {
        self.pause().await;
        let mut state = self.state();
        state.refund_calls += 1;
        if let Some(error) = state.fail_next_refund.take() {
            return Err(error);
        }
        if !state.payments.contains_key(payment_id) {
            return Err(not_found("payment", payment_id));
        }
        state.next_id += 1;
        let id = format!("rfnd_{:06}", state.next_id);
        state.refunds.push((payment_id.to_string(), amount));
        Ok(RemoteRefund {
            raw: json!({
                "id": id,
                "entity": "refund",
                "payment_id": payment_id,
                "amount": amount.map(|a| a.minor_units()),
                "status": "processed",
            }),
            id,
        })
    }

    fn webhook_signature_header(&self) -> &'static str {
        "x-razorpay-signature"
    }

    fn webhook_event_id_header(&self) -> Option<&'static str> {
        Some("x-razorpay-event-id")
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<WebhookSummary, GatewayError> {
        razorpay::parse_webhook_body(body)
    }
}
