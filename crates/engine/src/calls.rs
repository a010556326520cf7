use std::future::Future;
use std::time::{Duration, Instant};

use gateway::GatewayError;

/// Runs a gateway call under `timeout`, recording its duration.
///
/// An elapsed timeout becomes [`GatewayError::Timeout`].
pub(crate) async fn gateway_call<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    let started = Instant::now();
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout),
    };
    metrics::histogram!("payment_gateway_call_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::warn!(operation, error = %e, transient = e.is_transient(), "gateway call failed");
    }
    result
}
