//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shadow_requests_total` (counter): client-facing requests by method, status
//! - `shadow_request_duration_seconds` (histogram): client-facing latency
//! - `shadow_backend_calls_total` (counter): backend calls by backend, result
//! - `shadow_backend_call_duration_seconds` (histogram): per backend
//! - `shadow_comparisons_total` (counter): comparison verdicts
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    counter!(
        "shadow_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("shadow_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_backend_call(backend: &'static str, result: &'static str, started: Instant) {
    counter!("shadow_backend_calls_total", "backend" => backend, "result" => result).increment(1);
    histogram!("shadow_backend_call_duration_seconds", "backend" => backend)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_comparison(verdict: &'static str) {
    counter!("shadow_comparisons_total", "verdict" => verdict).increment(1);
}
