//! Checkout callback verification and capture.
//!
//! Only the signed identifiers are trusted. The payment's state always comes
//! from the gateway, fetched server-to-server after the signature checks out.

use std::sync::Arc;

use chrono::Utc;
use common::{TenantId, TransactionId};
use domain::{
    DUPLICATE_CAPTURE, OrderStatus, PaymentOrder, PaymentTransaction, SIGNATURE_INVALID,
    TransactionStatus,
};
use gateway::{GatewayAdapter, GatewayCredentials, GatewayRegistry, RemotePayment, RemotePaymentStatus};
use payment_store::PaymentStore;
use serde::Deserialize;

use crate::calls::gateway_call;
use crate::collaborators::{FeeLedger, Receipt, ReceiptNotifier};
use crate::orders::expire_if_due;
use crate::outcome::{Failure, FailureKind, VerificationOutcome};
use crate::{EngineConfig, EngineError, GatewayConfigStore, Result};

const ORDER_MISMATCH: &str = "ORDER_MISMATCH";
const AMOUNT_MISMATCH: &str = "AMOUNT_MISMATCH";
const PAYMENT_FAILED: &str = "PAYMENT_FAILED";

/// The triple a client posts back after checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub tenant_id: TenantId,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Verifies checkout callbacks and captures payments.
#[derive(Clone)]
pub struct VerificationEngine<S: PaymentStore> {
    store: S,
    configs: GatewayConfigStore<S>,
    registry: Arc<GatewayRegistry>,
    config: Arc<EngineConfig>,
    ledger: Arc<dyn FeeLedger>,
    notifier: Arc<dyn ReceiptNotifier>,
}

impl<S: PaymentStore + Clone> VerificationEngine<S> {
    pub fn new(
        store: S,
        registry: Arc<GatewayRegistry>,
        config: Arc<EngineConfig>,
        ledger: Arc<dyn FeeLedger>,
        notifier: Arc<dyn ReceiptNotifier>,
    ) -> Self {
        Self {
            configs: GatewayConfigStore::new(store.clone()),
            store,
            registry,
            config,
            ledger,
            notifier,
        }
    }

    /// Verifies a checkout callback and records the attempt.
    ///
    /// Every call writes a transaction, including forged ones. The order only
    /// moves when the gateway confirms the payment. Repeating a successful
    /// verification adds a transaction, failed with `DUPLICATE_CAPTURE`, and
    /// leaves the order and the fee ledger as they were.
    #[tracing::instrument(
        skip(self, request),
        fields(
            tenant_id = %request.tenant_id,
            gateway_order_id = %request.gateway_order_id,
            gateway_payment_id = %request.gateway_payment_id
        )
    )]
    pub async fn verify_payment(&self, request: VerifyPaymentRequest) -> Result<VerificationOutcome> {
        let mut order = self
            .store
            .find_by_gateway_order_id(&request.gateway_order_id)
            .await?
            .filter(|o| o.tenant_id == request.tenant_id)
            .ok_or_else(|| EngineError::OrderNotFound(request.gateway_order_id.clone()))?;

        let now = Utc::now();
        if expire_if_due(&self.store, &mut order, now).await? {
            metrics::counter!("payment_verifications_total", "outcome" => "order_expired").increment(1);
            return Err(EngineError::OrderExpired(order.order_number));
        }
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Failed) {
            return Err(EngineError::OrderNotPayable {
                order_number: order.order_number,
                status: order.status,
            });
        }

        let config = self.configs.config_for_order(&order).await?;
        let adapter = self.adapter(&order)?;
        let credentials = GatewayCredentials::from(&config);

        let verified = adapter.verify_signature(
            &credentials,
            &request.gateway_order_id,
            &request.gateway_payment_id,
            &request.signature,
        );
        let mut transaction = PaymentTransaction::attempt(
            &order,
            &request.gateway_order_id,
            &request.gateway_payment_id,
            &request.signature,
            verified,
            now,
        );
        self.store.insert_transaction(&transaction).await?;

        if !verified {
            tracing::warn!(
                order_number = %order.order_number,
                transaction_id = %transaction.id,
                "payment signature verification failed"
            );
            let failure = Failure::new(
                FailureKind::SignatureInvalid,
                Some(SIGNATURE_INVALID.to_string()),
                "Payment signature verification failed",
            );
            return Ok(self.failed(transaction, &order, failure));
        }

        let fetched = gateway_call(
            "fetch_payment",
            self.config.gateway_timeout,
            adapter.fetch_payment(&credentials, &request.gateway_payment_id),
        )
        .await;
        match fetched {
            Ok(payment) => self.apply_remote(order, transaction, payment).await,
            Err(error) => {
                transaction.mark_failed(error.code(), error.to_string(), None, Utc::now())?;
                self.store
                    .update_transaction(&transaction, TransactionStatus::Pending)
                    .await?;
                let failure = Failure::from_gateway(&error);
                Ok(self.failed(transaction, &order, failure))
            }
        }
    }

    /// Captures an authorized transaction at the gateway.
    ///
    /// Capturing an already captured transaction returns its current state
    /// without calling the gateway.
    #[tracing::instrument(skip(self))]
    pub async fn capture_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<VerificationOutcome> {
        let transaction = self
            .store
            .find_transaction(tenant_id, transaction_id)
            .await?
            .ok_or(EngineError::TransactionNotFound(transaction_id))?;
        let order = self
            .store
            .find_order(tenant_id, transaction.order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(transaction.order_id.to_string()))?;

        if transaction.status == TransactionStatus::Captured {
            return Ok(VerificationOutcome {
                success: true,
                message: "Payment already captured".to_string(),
                order_status: order.status,
                transaction,
                failure: None,
            });
        }
        if transaction.status != TransactionStatus::Authorized {
            return Err(EngineError::InvalidRequest(format!(
                "transaction {} is {}, only authorized payments can be captured",
                transaction.id, transaction.status
            )));
        }
        if order.status == OrderStatus::Cancelled || order.status.is_paid() {
            return Err(EngineError::OrderNotPayable {
                order_number: order.order_number,
                status: order.status,
            });
        }

        let config = self.configs.config_for_order(&order).await?;
        let adapter = self.adapter(&order)?;
        let captured = gateway_call(
            "capture_payment",
            self.config.gateway_timeout,
            adapter.capture_payment(
                &GatewayCredentials::from(&config),
                &transaction.gateway_payment_id,
                transaction.amount,
                transaction.currency,
            ),
        )
        .await;
        match captured {
            Ok(payment) => self.apply_remote(order, transaction, payment).await,
            // The authorization still stands; nothing to record.
            Err(error) => Ok(self.failed(transaction, &order, Failure::from_gateway(&error))),
        }
    }

    fn adapter(&self, order: &PaymentOrder) -> Result<Arc<dyn GatewayAdapter>> {
        self.registry
            .get(order.gateway)
            .map_err(|_| EngineError::GatewayNotConfigured(order.gateway))
    }

    /// Applies the gateway's view of a payment to a verified transaction and
    /// its order.
    async fn apply_remote(
        &self,
        mut order: PaymentOrder,
        mut transaction: PaymentTransaction,
        payment: RemotePayment,
    ) -> Result<VerificationOutcome> {
        let expected = transaction.status;
        let now = Utc::now();

        if let Some((code, reason)) = mismatch(&order, &transaction, &payment) {
            transaction.mark_failed(code, reason.clone(), Some(payment.raw), now)?;
            self.store.update_transaction(&transaction, expected).await?;
            tracing::warn!(
                order_number = %order.order_number,
                transaction_id = %transaction.id,
                %reason,
                "gateway payment does not match order"
            );
            let failure = Failure::new(FailureKind::PaymentMismatch, Some(code.to_string()), reason);
            return Ok(self.failed(transaction, &order, failure));
        }

        match payment.status {
            RemotePaymentStatus::Captured => {
                if !self.record_capture(&mut order).await? {
                    return self.duplicate_capture(&order, transaction, payment, expected).await;
                }
                transaction.mark_captured(payment.method, payment.raw, now)?;
                self.store.update_transaction(&transaction, expected).await?;
                self.settle(&order, &transaction).await;

                metrics::counter!("payment_verifications_total", "outcome" => "captured").increment(1);
                tracing::info!(
                    order_number = %order.order_number,
                    transaction_id = %transaction.id,
                    "payment captured"
                );
                Ok(VerificationOutcome {
                    success: true,
                    message: "Payment verified and captured".to_string(),
                    order_status: order.status,
                    transaction,
                    failure: None,
                })
            }
            RemotePaymentStatus::Authorized => {
                transaction.mark_authorized(payment.method, payment.raw, now)?;
                self.store.update_transaction(&transaction, expected).await?;
                self.advance_order(&mut order, OrderStatus::Authorized).await?;

                let failure = Failure::new(
                    FailureKind::PaymentNotCaptured,
                    Some(payment.provider_status),
                    "Payment authorized but not yet captured",
                );
                Ok(self.failed(transaction, &order, failure))
            }
            RemotePaymentStatus::Failed => {
                let code = payment.error_code.unwrap_or_else(|| PAYMENT_FAILED.to_string());
                let message = payment
                    .error_description
                    .unwrap_or_else(|| format!("Payment status is {}", payment.provider_status));
                transaction.mark_failed(code.clone(), message.clone(), Some(payment.raw), now)?;
                self.store.update_transaction(&transaction, expected).await?;

                let failure = Failure::new(FailureKind::PaymentNotCaptured, Some(code), message);
                Ok(self.failed(transaction, &order, failure))
            }
        }
    }

    /// Records a capture for an order that another transaction already paid.
    ///
    /// The new row is kept as `Failed` with `DUPLICATE_CAPTURE` so an order
    /// never has more than one captured transaction. A repeat of the payment
    /// that paid the order is reported as success with the original row.
    async fn duplicate_capture(
        &self,
        order: &PaymentOrder,
        mut transaction: PaymentTransaction,
        payment: RemotePayment,
        expected: TransactionStatus,
    ) -> Result<VerificationOutcome> {
        let original = self
            .store
            .list_transactions_for_order(order.tenant_id, order.id)
            .await?
            .into_iter()
            .filter(|t| t.id != transaction.id && t.signature_verified)
            .filter(|t| t.status != TransactionStatus::Failed)
            .find(|t| t.gateway_payment_id == transaction.gateway_payment_id);

        transaction.method = payment.method.or(transaction.method.take());
        transaction.mark_failed(
            DUPLICATE_CAPTURE,
            format!("order {} is already paid", order.order_number),
            Some(payment.raw),
            Utc::now(),
        )?;
        self.store.update_transaction(&transaction, expected).await?;

        match original {
            Some(original) => {
                metrics::counter!("payment_verifications_total", "outcome" => "already_captured")
                    .increment(1);
                tracing::info!(
                    order_number = %order.order_number,
                    transaction_id = %transaction.id,
                    original_transaction_id = %original.id,
                    "payment already captured"
                );
                Ok(VerificationOutcome {
                    success: true,
                    message: "Payment already captured".to_string(),
                    order_status: order.status,
                    transaction: original,
                    failure: None,
                })
            }
            None => {
                tracing::warn!(
                    order_number = %order.order_number,
                    transaction_id = %transaction.id,
                    gateway_payment_id = %transaction.gateway_payment_id,
                    "second payment captured for a paid order"
                );
                let failure = Failure::new(
                    FailureKind::DuplicatePayment,
                    Some(DUPLICATE_CAPTURE.to_string()),
                    "Order was already paid by another payment",
                );
                Ok(self.failed(transaction, order, failure))
            }
        }
    }

    /// Moves the order to `Captured`. Returns false when it was already paid.
    async fn record_capture(&self, order: &mut PaymentOrder) -> Result<bool> {
        if order.status.is_paid() {
            return Ok(false);
        }
        let expected = order.status;
        order.transition_to(OrderStatus::Captured, Utc::now())?;
        order.receipt_url = self.config.receipt_url(&order.order_number);
        match self.store.update_order(order, expected).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_conflict() => {
                // A concurrent verification of the same order won the write.
                let current = self
                    .store
                    .find_order(order.tenant_id, order.id)
                    .await?
                    .ok_or_else(|| EngineError::OrderNotFound(order.order_number.clone()))?;
                if current.status.is_paid() {
                    *order = current;
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the order forward to `next`, ignoring requests that would regress it.
    async fn advance_order(&self, order: &mut PaymentOrder, next: OrderStatus) -> Result<()> {
        if order.status != next && !order.status.can_transition_to(next) {
            tracing::warn!(
                order_number = %order.order_number,
                from = %order.status,
                to = %next,
                "ignoring order status regression"
            );
            return Ok(());
        }
        let expected = order.status;
        if order.transition_to(next, Utc::now())?.is_changed() {
            self.store.update_order(order, expected).await?;
        }
        Ok(())
    }

    /// Ledger and receipt side effects of the capture that paid the order.
    /// Failures are logged only.
    async fn settle(&self, order: &PaymentOrder, transaction: &PaymentTransaction) {
        if let Some(record_id) = &order.ledger_record_id
            && let Err(e) = self
                .ledger
                .mark_paid(order.tenant_id, record_id, transaction.id)
                .await
        {
            tracing::error!(
                order_number = %order.order_number,
                ledger_record_id = %record_id,
                error = %e,
                "failed to mark fee ledger record paid"
            );
        }

        let notifier = self.notifier.clone();
        let receipt = Receipt {
            payer: order.payer.clone(),
            order_number: order.order_number.clone(),
            amount: order.total_amount,
            currency: order.currency,
            receipt_url: order.receipt_url.clone(),
        };
        tokio::spawn(async move {
            let order_number = receipt.order_number.clone();
            if let Err(e) = notifier.send_receipt(receipt).await {
                tracing::error!(%order_number, error = %e, "failed to send payment receipt");
            }
        });
    }

    fn failed(
        &self,
        transaction: PaymentTransaction,
        order: &PaymentOrder,
        failure: Failure,
    ) -> VerificationOutcome {
        metrics::counter!("payment_verifications_total", "outcome" => failure.kind.as_str()).increment(1);
        VerificationOutcome {
            success: false,
            message: failure.message.clone(),
            transaction,
            order_status: order.status,
            failure: Some(failure),
        }
    }
}

/// Checks the fetched payment belongs to this order and amount.
fn mismatch(
    order: &PaymentOrder,
    transaction: &PaymentTransaction,
    payment: &RemotePayment,
) -> Option<(&'static str, String)> {
    if let Some(remote_order) = &payment.order_id
        && *remote_order != transaction.gateway_order_id
    {
        return Some((
            ORDER_MISMATCH,
            format!("payment belongs to order {remote_order}, not {}", transaction.gateway_order_id),
        ));
    }
    if let Some(amount) = payment.amount
        && amount != order.total_amount
    {
        return Some((
            AMOUNT_MISMATCH,
            format!("payment amount {amount} does not match order total {}", order.total_amount),
        ));
    }
    None
}
