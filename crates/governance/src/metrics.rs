//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use secure_exec_core::{AuditOutcome, Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::governance(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Track one finished request (count by outcome, latency).
pub fn track_execution(tool: &str, outcome: AuditOutcome, latency_sec: f64) {
    metrics::counter!(
        "secure_exec_requests_total",
        "tool" => tool.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    metrics::histogram!("secure_exec_duration_seconds", "tool" => tool.to_string())
        .record(latency_sec);
}

/// Track a container teardown.
pub fn track_container_destroyed(forced: bool) {
    metrics::counter!(
        "secure_exec_containers_destroyed_total",
        "forced" => if forced { "true" } else { "false" }
    )
    .increment(1);
}
