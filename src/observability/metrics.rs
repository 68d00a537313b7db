//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rejections_total` (counter): local rejections by kind
//! - `gateway_encrypt_fallback_total` (counter): plaintext PASS_THROUGH responses
//!
//! # Design Decisions
//! - Macros are no-ops until `init_metrics` installs a recorder
//! - Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and start its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a request rejected by the security pipeline.
pub fn record_rejection(kind: &'static str) {
    metrics::counter!("gateway_rejections_total", "kind" => kind).increment(1);
}

/// Record a response sent as plaintext after an encryption failure.
pub fn record_encrypt_fallback() {
    metrics::counter!("gateway_encrypt_fallback_total").increment(1);
}
