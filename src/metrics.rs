// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for tunnelsync.
//!
//! All metrics carry the namespace prefix `tunnelsync_`.
//!
//! # Metrics Categories
//!
//! - **Cycle Metrics** - Outcome and duration of every reconciliation cycle
//! - **DNS Metrics** - Upserts and deletions by result
//! - **State Metrics** - Routes under management and hostnames pending cleanup
//! - **Error Metrics** - Failures by taxonomy kind
//!
//! # Example
//!
//! ```rust,no_run
//! use tunnelsync::metrics::{gather_metrics, record_cycle};
//!
//! record_cycle("success", std::time::Duration::from_secs(1));
//! let text = gather_metrics().unwrap();
//! ```

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "tunnelsync";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` in watch mode.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Cycle Metrics
// ============================================================================

/// Total number of reconciliation cycles by outcome
///
/// Labels:
/// - `outcome`: `success`, `partial_failure` or `fatal`
pub static CYCLES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cycles_total"),
        "Total number of reconciliation cycles by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation cycles in seconds
pub static CYCLE_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_cycle_duration_seconds"),
        "Duration of reconciliation cycles in seconds",
    )
    .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// DNS Metrics
// ============================================================================

/// Total number of DNS record operations
///
/// Labels:
/// - `operation`: `upsert` or `delete`
/// - `result`: `created`, `updated`, `unchanged`, `deleted`, `skipped` or `error`
pub static DNS_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dns_operations_total"),
        "Total number of DNS record operations by operation and result",
    );
    let counter = CounterVec::new(opts, &["operation", "result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// State Metrics
// ============================================================================

/// Number of routes committed by the last successful cycle
pub static MANAGED_ROUTES: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        format!("{METRICS_NAMESPACE}_managed_routes"),
        "Number of routes committed by the last successful cycle",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Number of removed hostnames whose DNS record still awaits deletion
pub static PENDING_CLEANUP: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        format!("{METRICS_NAMESPACE}_pending_cleanup"),
        "Number of removed hostnames whose DNS record still awaits deletion",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by taxonomy kind
///
/// Labels:
/// - `kind`: e.g. `TransportFailure`, `AuthFailure`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a finished cycle
///
/// # Arguments
/// * `outcome` - `success`, `partial_failure` or `fatal`
/// * `duration` - Wall time of the cycle
pub fn record_cycle(outcome: &str, duration: Duration) {
    CYCLES_TOTAL.with_label_values(&[outcome]).inc();
    CYCLE_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a DNS record operation
pub fn record_dns_operation(operation: &str, result: &str) {
    DNS_OPERATIONS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

/// Record an error by taxonomy kind
pub fn record_error(kind: &str) {
    ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record committed state sizes
pub fn record_committed_state(routes: usize, pending_cleanup: usize) {
    MANAGED_ROUTES.set(i64::try_from(routes).unwrap_or(i64::MAX));
    PENDING_CLEANUP.set(i64::try_from(pending_cleanup).unwrap_or(i64::MAX));
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
