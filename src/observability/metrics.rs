//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, policy outcomes)
//! - Expose Prometheus-compatible metrics endpoint
//! - Keep call sites to one-line hooks
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution by route
//! - `gateway_rate_limited_total` (counter): rejections by route
//! - `gateway_cache_lookups_total` (counter): hit/miss by route
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_aggregate_parts_total` (counter): ok/failed sub-calls by aggregate
//! - `gateway_config_reloads_total` (counter): accepted/rejected reloads
//!
//! # Design Decisions
//! - Hooks go through the `metrics` facade; without an installed recorder they are no-ops
//! - Labels for route, method, status code; never for client ids

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limited(route: &str) {
    metrics::counter!("gateway_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_cache_lookup(route: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!(
        "gateway_cache_lookups_total",
        "route" => route.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_circuit_state(route: &str, state: CircuitState) {
    metrics::gauge!("gateway_circuit_state", "route" => route.to_string()).set(state.as_gauge());
}

pub fn record_aggregate_part(aggregate: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    metrics::counter!(
        "gateway_aggregate_parts_total",
        "aggregate" => aggregate.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_config_reload(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    metrics::counter!("gateway_config_reloads_total", "outcome" => outcome).increment(1);
}
