// src/metrics.rs
// Prometheus metrics for the tool pipeline and transports.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

/// Duration histogram boundaries in milliseconds.
const DURATION_BOUNDARIES_MS: &[f64] = &[
    10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Global Prometheus handle for metrics rendering
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics exporter. Safe to call once per
/// process; later calls are no-ops so tests can share a recorder.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("mcp.tool.duration_ms".to_string()),
            DURATION_BOUNDARIES_MS,
        )
        .unwrap_or_else(|_| PrometheusBuilder::new())
        .install_recorder();
    match handle {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!("Prometheus metrics initialized");
        }
        Err(e) => {
            // A recorder may already be installed by an embedding test
            // harness; metrics still flow to it.
            tracing::debug!("Metrics recorder not installed: {}", e);
        }
    }
}

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Record one tool execution with outcome and duration.
pub fn record_tool_execution(tool: &str, tenant: &str, success: bool, duration_ms: f64) {
    counter!("mcp.tool.executions", "tool" => tool.to_string(), "tenant" => tenant.to_string())
        .increment(1);
    if !success {
        counter!("mcp.tool.errors", "tool" => tool.to_string(), "tenant" => tenant.to_string())
            .increment(1);
    }
    histogram!("mcp.tool.duration_ms", "tool" => tool.to_string(), "tenant" => tenant.to_string())
        .record(duration_ms);
}

/// Record a circuit-breaker rejection.
pub fn record_circuit_open(tool: &str) {
    counter!("mcp.tool.circuit_open", "tool" => tool.to_string()).increment(1);
}

/// Record an overload rejection at the global semaphore.
pub fn record_overloaded(tool: &str) {
    counter!("mcp.tool.overloaded", "tool" => tool.to_string()).increment(1);
}

/// Track attached SSE subscribers.
pub fn subscriber_attached() {
    gauge!("mcp.events.subscribers").increment(1.0);
}

pub fn subscriber_detached() {
    gauge!("mcp.events.subscribers").decrement(1.0);
}
