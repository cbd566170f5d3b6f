//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_sessions_total` (counter): finished sessions by outcome
//! - `proxy_rejections_total` (counter): synthesized error responses by status
//! - `proxy_response_bytes_total` (counter): origin bytes relayed to clients
//! - `proxy_active_sessions` (gauge): current session count
//! - `proxy_session_duration_seconds` (histogram): accept to close

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn session_opened() {
    gauge!("proxy_active_sessions").increment(1.0);
}

pub fn session_closed() {
    gauge!("proxy_active_sessions").decrement(1.0);
}

pub fn record_session(outcome: &'static str, started: Instant) {
    counter!("proxy_sessions_total", "outcome" => outcome).increment(1);
    histogram!("proxy_session_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_rejection(status: u16) {
    counter!("proxy_rejections_total", "status" => status.to_string()).increment(1);
}

pub fn record_response_bytes(bytes: u64) {
    counter!("proxy_response_bytes_total").increment(bytes);
}
