//! Services the engine calls out to but does not own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common::{Currency, Money, TenantId, TransactionId};
use domain::PayerInfo;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// The school's fee ledger.
#[async_trait]
pub trait FeeLedger: Send + Sync {
    /// Marks a ledger record paid. Repeating a call with the same arguments
    /// must have no further effect.
    async fn mark_paid(
        &self,
        tenant_id: TenantId,
        ledger_record_id: &str,
        transaction_id: TransactionId,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub payer: PayerInfo,
    pub order_number: String,
    pub amount: Money,
    pub currency: Currency,
    pub receipt_url: Option<String>,
}

/// Delivers payment receipts to payers. Called fire-and-forget.
#[async_trait]
pub trait ReceiptNotifier: Send + Sync {
    async fn send_receipt(&self, receipt: Receipt) -> Result<(), CollaboratorError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct LedgerState {
    paid: HashMap<(TenantId, String), TransactionId>,
    calls: usize,
    fail: bool,
}

/// In-process fee ledger. Keeps the first transaction that paid each record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeeLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryFeeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail until reset.
    pub fn set_fail(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    pub fn paid_by(&self, tenant_id: TenantId, ledger_record_id: &str) -> Option<TransactionId> {
        lock(&self.state)
            .paid
            .get(&(tenant_id, ledger_record_id.to_string()))
            .copied()
    }

    pub fn paid_count(&self) -> usize {
        lock(&self.state).paid.len()
    }

    pub fn calls(&self) -> usize {
        lock(&self.state).calls
    }
}

#[async_trait]
impl FeeLedger for InMemoryFeeLedger {
    async fn mark_paid(
        &self,
        tenant_id: TenantId,
        ledger_record_id: &str,
        transaction_id: TransactionId,
    ) -> Result<(), CollaboratorError> {
        let mut state = lock(&self.state);
        state.calls += 1;
        if state.fail {
            return Err(CollaboratorError("ledger unavailable".to_string()));
        }
        state
            .paid
            .entry((tenant_id, ledger_record_id.to_string()))
            .or_insert(transaction_id);
        Ok(())
    }
}

/// Notifier that records receipts instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReceiptNotifier {
    sent: Arc<Mutex<Vec<Receipt>>>,
}

impl InMemoryReceiptNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Receipt> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl ReceiptNotifier for InMemoryReceiptNotifier {
    async fn send_receipt(&self, receipt: Receipt) -> Result<(), CollaboratorError> {
        tracing::info!(order_number = %receipt.order_number, "receipt queued");
        lock(&self.sent).push(receipt);
        Ok(())
    }
}
