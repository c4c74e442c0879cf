//! Tracing setup and per-provider call metrics.
//!
//! Metrics are plain `tracing` events under [`METRICS_TARGET`] so any
//! subscriber layer (fmt, OTLP exporter, test writer) can pick them up.

use tracing_subscriber::EnvFilter;

use crate::types::ProviderResponse;

/// Target for per-provider call metrics.
pub const METRICS_TARGET: &str = "orchestrator::metrics";

/// Target for context store events (evictions, resets).
pub const STORE_TARGET: &str = "orchestrator::store";

/// Install a global fmt subscriber honouring `RUST_LOG`.
///
/// Falls back to `default_filter` when `RUST_LOG` is unset. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Emit the latency and outcome counters for one provider call.
pub fn record_provider_call(task_id: &str, response: &ProviderResponse) {
    let failure = response
        .failure
        .as_ref()
        .map(|f| f.to_string())
        .unwrap_or_default();
    tracing::info!(
        target: METRICS_TARGET,
        task_id,
        provider = %response.provider,
        latency_ms = response.latency_ms,
        success = response.success,
        cost = response.cost,
        tokens = response.tokens_used,
        failure = %failure,
        "provider call finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureReason;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("orchestrator=debug");
        init_tracing("orchestrator=debug");
    }

    #[test]
    fn test_record_provider_call_accepts_failures() {
        init_tracing("orchestrator=debug");
        let response = ProviderResponse::failed(
            "p1",
            0,
            vec![],
            10,
            FailureReason::Timeout { timeout_ms: 10 },
        );
        record_provider_call("task-1", &response);
    }
}
