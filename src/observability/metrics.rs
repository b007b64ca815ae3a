//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_admissions_total` (counter): admission decisions by dependency
//! - `guard_calls_total` (counter): settled calls by dependency, outcome
//! - `guard_call_duration_seconds` (histogram): admission-to-settlement latency
//! - `guard_breaker_transitions_total` (counter): transitions by dependency, state
//! - `guard_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `guard_retries_total` (counter): supervisor retries by dependency
//! - `guard_rate_limited_total` (counter): rejections by category, tier
//! - `guard_probe_results_total` (counter): health probes by dependency, result
//!
//! # Design Decisions
//! - Low-overhead updates (atomic operations behind the `metrics` facade)
//! - Prometheus exposition on its own listener, separate from ops traffic

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter. Failure is logged, not fatal: the
/// guard keeps working without exposition.
pub fn init(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_admission(dependency: &str, decision: &'static str) {
    metrics::counter!(
        "guard_admissions_total",
        "dependency" => dependency.to_string(),
        "decision" => decision
    )
    .increment(1);
}

pub fn record_call(dependency: &str, outcome: &'static str, duration: Duration) {
    metrics::counter!(
        "guard_calls_total",
        "dependency" => dependency.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "guard_call_duration_seconds",
        "dependency" => dependency.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_breaker_transition(dependency: &str, to_state: &'static str) {
    metrics::counter!(
        "guard_breaker_transitions_total",
        "dependency" => dependency.to_string(),
        "state" => to_state
    )
    .increment(1);
    let level = match to_state {
        "open" => 2.0,
        "half_open" => 1.0,
        _ => 0.0,
    };
    metrics::gauge!(
        "guard_breaker_state",
        "dependency" => dependency.to_string()
    )
    .set(level);
}

pub fn record_retry(dependency: &str) {
    metrics::counter!(
        "guard_retries_total",
        "dependency" => dependency.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited(category: &str, tier: &str) {
    metrics::counter!(
        "guard_rate_limited_total",
        "category" => category.to_string(),
        "tier" => tier.to_string()
    )
    .increment(1);
}

pub fn record_probe(dependency: &str, healthy: bool) {
    metrics::counter!(
        "guard_probe_results_total",
        "dependency" => dependency.to_string(),
        "result" => if healthy { "healthy" } else { "unhealthy" }
    )
    .increment(1);
}
