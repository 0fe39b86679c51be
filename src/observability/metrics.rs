//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define client metrics (requests, latency, retries, offline decisions)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track session transitions
//!
//! # Metrics
//! - `client_requests_total` (counter): total requests by method, status
//! - `client_request_duration_seconds` (histogram): latency distribution
//! - `client_retries_total` (counter): scheduled retries by error kind
//! - `client_offline_decisions_total` (counter): dispatcher decisions
//! - `client_offline_queue_depth` (gauge): deferred operations awaiting replay
//! - `client_session_transitions_total` (counter): session state changes
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade
//! - No recorder installed means every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one transport call. `status` is 0 when no response arrived.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("client_requests_total", "method" => method.to_string(), "status" => status.clone()).increment(1);
    histogram!("client_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(kind: &'static str) {
    counter!("client_retries_total", "kind" => kind).increment(1);
}

pub fn record_offline_decision(decision: &'static str) {
    counter!("client_offline_decisions_total", "decision" => decision).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("client_offline_queue_depth").set(depth as f64);
}

pub fn record_session_transition(to: &'static str) {
    counter!("client_session_transitions_total", "to" => to).increment(1);
}
