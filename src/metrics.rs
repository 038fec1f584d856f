//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener when `METRICS_PORT` is
//! non-zero.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `pipeline_short_circuits_total` - Chains stopped early (labels: route, unit)
//! - `pipeline_unit_failures_total` - Units that errored or panicked (labels: route, unit, kind)
//! - `rate_limit_decisions_total` - Limiter decisions (labels: scope, outcome)
//! - `rate_limit_evicted_keys_total` - Idle keys dropped by the sweeper
//!
//! ## Histograms
//! - `pipeline_chain_duration_seconds` - Time spent in units before the handler (labels: route, outcome)
//!
//! ## Gauges
//! - `rate_limit_tracked_keys` - Keys currently held by the in-memory store
//!
//! # Usage
//!
//! ```rust,ignore
//! use request_pipeline::metrics::{init_metrics, record_rate_limit_decision};
//!
//! // Initialize metrics (call once at startup)
//! init_metrics("0.0.0.0:9090".parse()?)?;
//!
//! record_rate_limit_decision("public", true);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const SHORT_CIRCUITS_TOTAL: &str = "pipeline_short_circuits_total";
    pub const UNIT_FAILURES_TOTAL: &str = "pipeline_unit_failures_total";
    pub const CHAIN_DURATION_SECONDS: &str = "pipeline_chain_duration_seconds";
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "rate_limit_decisions_total";
    pub const RATE_LIMIT_EVICTED_KEYS_TOTAL: &str = "rate_limit_evicted_keys_total";
    pub const RATE_LIMIT_TRACKED_KEYS: &str = "rate_limit_tracked_keys";
}

/// Initialize the Prometheus metrics exporter.
///
/// Sets up metric descriptions and starts the Prometheus HTTP listener on
/// `metrics_addr`.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::SHORT_CIRCUITS_TOTAL,
        "Total number of chains stopped by a middleware unit"
    );
    describe_counter!(
        names::UNIT_FAILURES_TOTAL,
        "Total number of middleware units that returned an error or panicked"
    );
    describe_counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "Total number of rate limit decisions"
    );
    describe_counter!(
        names::RATE_LIMIT_EVICTED_KEYS_TOTAL,
        "Total number of idle rate limit keys evicted"
    );

    describe_histogram!(
        names::CHAIN_DURATION_SECONDS,
        "Time spent running middleware units, in seconds"
    );

    describe_gauge!(
        names::RATE_LIMIT_TRACKED_KEYS,
        "Number of keys held by the in-memory rate limit store"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

/// Record a chain stopped early by `unit`.
pub fn record_short_circuit(route: &str, unit: &str) {
    counter!(names::SHORT_CIRCUITS_TOTAL, "route" => route.to_string(), "unit" => unit.to_string())
        .increment(1);
}

/// Record a unit failure. `kind` is `error`, `panic` or `cancelled`.
pub fn record_unit_failure(route: &str, unit: &str, kind: &'static str) {
    counter!(names::UNIT_FAILURES_TOTAL, "route" => route.to_string(), "unit" => unit.to_string(), "kind" => kind)
        .increment(1);
}

/// Record one limiter decision.
pub fn record_rate_limit_decision(scope: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!(names::RATE_LIMIT_DECISIONS_TOTAL, "scope" => scope.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record keys dropped by an idle sweep.
pub fn record_keys_evicted(count: usize) {
    counter!(names::RATE_LIMIT_EVICTED_KEYS_TOTAL).increment(count as u64);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record how long the units of a chain took. `outcome` is `passed`,
/// `short_circuit`, `failed` or `cancelled`.
pub fn record_chain_duration(route: &str, outcome: &'static str, duration_secs: f64) {
    histogram!(names::CHAIN_DURATION_SECONDS, "route" => route.to_string(), "outcome" => outcome)
        .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

/// Update the tracked-keys gauge.
pub fn set_tracked_keys(count: usize) {
    gauge!(names::RATE_LIMIT_TRACKED_KEYS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only verify the recorders don't panic without an installed exporter.

    #[test]
    fn test_record_short_circuit() {
        record_short_circuit("GET /api/whoami", "RateLimitUnit");
    }

    #[test]
    fn test_record_unit_failure() {
        record_unit_failure("POST /api/revalidate", "SharedSecretAuth", "panic");
    }

    #[test]
    fn test_record_rate_limit_decision() {
        record_rate_limit_decision("public", true);
        record_rate_limit_decision("public", false);
    }

    #[test]
    fn test_record_chain_duration() {
        record_chain_duration("GET /api/whoami", "passed", 0.002);
    }

    #[test]
    fn test_store_gauges() {
        record_keys_evicted(3);
        set_tracked_keys(0);
    }
}
