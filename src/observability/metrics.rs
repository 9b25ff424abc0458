//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_breaker_transitions_total` (counter): state changes by breaker, state
//! - `guard_breaker_rejected_total` (counter): fast-failed calls by breaker
//! - `guard_slow_calls_total` (counter): completed-but-slow calls by label
//! - `guard_timeouts_total` (counter): deadline hits by label
//! - `guard_fallbacks_total` (counter): fallback substitutions by service
//! - `guard_rate_limited_total` (counter): throttled requests by reason
//!
//! # Design Decisions
//! - Low-overhead updates through the `metrics` facade
//! - A Prometheus recorder is installed by the embedding service via
//!   [`install_recorder`]; without it the counters are no-ops

use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder and return the handle
/// the embedding service renders its scrape endpoint from.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// A breaker changed state.
pub fn record_breaker_transition(breaker: &str, to: &str) {
    counter!(
        "guard_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// A call was fast-failed by an open breaker.
pub fn record_breaker_rejected(breaker: &str) {
    counter!("guard_breaker_rejected_total", "breaker" => breaker.to_string()).increment(1);
}

/// A call completed but exceeded the slow threshold.
pub fn record_slow_call(label: &str) {
    counter!("guard_slow_calls_total", "call" => label.to_string()).increment(1);
}

/// A call hit its deadline.
pub fn record_timeout(label: &str) {
    counter!("guard_timeouts_total", "call" => label.to_string()).increment(1);
}

/// A degraded service served its fallback.
pub fn record_fallback(service: &str) {
    counter!("guard_fallbacks_total", "service" => service.to_string()).increment(1);
}

/// An inbound request was throttled.
pub fn record_rate_limited(reason: &str) {
    counter!("guard_rate_limited_total", "reason" => reason.to_string()).increment(1);
}
