//! Audit log of gateway webhooks.
//!
//! Deliveries are verified and recorded, never acted on here. Valid ones stay
//! unprocessed until a reconciliation pass marks them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use common::NotificationId;
use domain::{GatewayKind, PaymentNotification, PaymentOrder};
use gateway::{GatewayAdapter, GatewayRegistry, WebhookSummary};
use payment_store::{PaymentStore, StoreError};
use secrecy::SecretString;

use crate::outcome::WebhookAck;
use crate::{EngineConfig, EngineError, Result};

/// Headers never written to the audit log.
const REDACTED_HEADERS: [&str; 2] = ["authorization", "cookie"];

const UNKNOWN_EVENT: &str = "unknown";

/// Records webhook deliveries.
#[derive(Clone)]
pub struct WebhookIngestor<S: PaymentStore> {
    store: S,
    registry: Arc<GatewayRegistry>,
    config: Arc<EngineConfig>,
}

impl<S: PaymentStore> WebhookIngestor<S> {
    pub fn new(store: S, registry: Arc<GatewayRegistry>, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Verifies and logs one delivery.
    ///
    /// `headers` are keyed by lowercase name. Anything short of a storage
    /// failure is acknowledged, including forged and unparseable bodies. A
    /// signed delivery repeating the event id of a signed row already logged
    /// is acknowledged as a duplicate without a second row. Unsigned
    /// deliveries are always logged and never dedupe against anything.
    #[tracing::instrument(skip(self, body, headers), fields(gateway = %gateway, bytes = body.len()))]
    pub async fn handle_webhook(
        &self,
        gateway: GatewayKind,
        body: &[u8],
        headers: &BTreeMap<String, String>,
    ) -> Result<WebhookAck> {
        let adapter = self
            .registry
            .get(gateway)
            .map_err(|_| EngineError::GatewayNotConfigured(gateway))?;

        let event_id = adapter
            .webhook_event_id_header()
            .and_then(|name| headers.get(name))
            .cloned();

        let summary = match adapter.parse_webhook(body) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable webhook body");
                WebhookSummary {
                    event_type: UNKNOWN_EVENT.to_string(),
                    order_id: None,
                    payment_id: None,
                }
            }
        };
        let order = match &summary.order_id {
            Some(order_id) => self.store.find_by_gateway_order_id(order_id).await?,
            None => None,
        };

        let signature = headers.get(adapter.webhook_signature_header()).cloned();
        let signature_valid = match (&signature, self.webhook_secret(gateway, order.as_ref()).await?) {
            (Some(signature), Some(secret)) => adapter.verify_webhook_signature(body, signature, &secret),
            _ => false,
        };

        if signature_valid
            && let Some(event_id) = &event_id
            && let Some(existing) = self.store.find_notification_by_event_id(gateway, event_id).await?
        {
            tracing::info!(%event_id, notification_id = %existing.id, "duplicate webhook delivery");
            return Ok(duplicate(&existing));
        }

        let now = Utc::now();
        let mut notification = PaymentNotification::received(
            gateway,
            summary.event_type.clone(),
            payload(body),
            audit_headers(headers),
            signature,
            signature_valid,
            now,
        );
        notification.event_id = event_id;
        if signature_valid && let Some(order) = &order {
            self.link(&mut notification, order, &summary, adapter.as_ref()).await?;
        }

        match self.store.insert_notification(&notification).await {
            Ok(()) => {}
            Err(StoreError::Duplicate { .. }) if signature_valid && notification.event_id.is_some() => {
                // A concurrent delivery of the same event was logged first.
                let event_id = notification.event_id.as_deref().unwrap_or_default();
                if let Some(existing) = self.store.find_notification_by_event_id(gateway, event_id).await? {
                    return Ok(duplicate(&existing));
                }
            }
            Err(e) => return Err(e.into()),
        }

        metrics::counter!(
            "payment_webhooks_total",
            "signature_valid" => if signature_valid { "true" } else { "false" }
        )
        .increment(1);
        if signature_valid {
            tracing::info!(
                notification_id = %notification.id,
                event_type = %notification.event_type,
                "webhook recorded"
            );
        } else {
            tracing::warn!(
                notification_id = %notification.id,
                event_type = %notification.event_type,
                "webhook signature invalid, recorded without trust"
            );
        }
        Ok(WebhookAck {
            notification_id: notification.id,
            signature_valid,
            duplicate: false,
        })
    }

    /// The tenant's webhook secret when the payload names a known order,
    /// otherwise the global one.
    async fn webhook_secret(
        &self,
        gateway: GatewayKind,
        order: Option<&PaymentOrder>,
    ) -> Result<Option<SecretString>> {
        if let Some(order) = order
            && let Some(config) = self.store.find_config(order.tenant_id, gateway).await?
            && let Some(secret) = config.webhook_secret
        {
            return Ok(Some(secret));
        }
        Ok(self.config.webhook_secret.clone())
    }

    async fn link(
        &self,
        notification: &mut PaymentNotification,
        order: &PaymentOrder,
        summary: &WebhookSummary,
        adapter: &dyn GatewayAdapter,
    ) -> Result<()> {
        if order.gateway != adapter.kind() {
            return Ok(());
        }
        notification.tenant_id = Some(order.tenant_id);
        notification.order_id = Some(order.id);
        if let Some(payment_id) = &summary.payment_id {
            notification.transaction_id = self
                .store
                .find_transaction_by_payment_id(order.tenant_id, payment_id)
                .await?
                .map(|t| t.id);
        }
        Ok(())
    }

    /// Valid deliveries awaiting reconciliation, oldest first.
    pub async fn pending_notifications(&self, limit: usize) -> Result<Vec<PaymentNotification>> {
        Ok(self.store.list_unprocessed_notifications(limit).await?)
    }

    /// Records the result of a reconciliation pass over one delivery.
    #[tracing::instrument(skip(self))]
    pub async fn mark_notification_processed(
        &self,
        id: NotificationId,
        error: Option<String>,
    ) -> Result<PaymentNotification> {
        if self.store.find_notification(id).await?.is_none() {
            return Err(EngineError::NotificationNotFound(id));
        }
        self.store
            .mark_notification_processed(id, error, Utc::now())
            .await?;
        self.store
            .find_notification(id)
            .await?
            .ok_or(EngineError::NotificationNotFound(id))
    }
}

fn duplicate(existing: &PaymentNotification) -> WebhookAck {
    WebhookAck {
        notification_id: existing.id,
        signature_valid: existing.signature_valid,
        duplicate: true,
    }
}

fn payload(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::json!({ "raw": String::from_utf8_lossy(body) }))
}

fn audit_headers(headers: &BTreeMap<String, String>) -> serde_json::Value {
    headers
        .iter()
        .filter(|(name, _)| !REDACTED_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
        .collect::<serde_json::Map<_, _>>()
        .into()
}
