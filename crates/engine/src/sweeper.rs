//! Periodic expiry of stale orders.

use std::sync::Arc;
use std::time::Duration;

use payment_store::PaymentStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::PaymentEngine;

/// Runs [`PaymentEngine::expire_stale_orders`] every `every` until aborted.
///
/// Expiry is also applied whenever an order is read, so a slow or missed
/// sweep only delays bookkeeping. Several instances may sweep at once.
pub fn spawn_expiry_sweeper<S>(engine: Arc<PaymentEngine<S>>, every: Duration) -> JoinHandle<()>
where
    S: PaymentStore + Clone + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match engine.expire_stale_orders().await {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "expiry sweep finished"),
                Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
            }
        }
    })
}
