// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for registry operations.
//!
//! All metrics carry the namespace prefix `clusterregistry_k8s_io_`
//! (prometheus-safe version of "clusterregistry.k8s.io").
//!
//! # Metrics Categories
//!
//! - **Request Metrics** - Count and time every store and client operation
//! - **Validation Metrics** - Count objects rejected by a strategy
//! - **Watch Metrics** - Track open watch streams
//!
//! # Example
//!
//! ```rust,no_run
//! use cluster_registry::metrics::{gather_metrics, record_request};
//!
//! record_request("Cluster", "create", "success", std::time::Duration::from_millis(3));
//! println!("{}", gather_metrics().unwrap());
//! ```

use crate::errors::RegistryError;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all registry metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "clusterregistry_k8s_io";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Request Metrics
// ============================================================================

/// Total number of registry requests
///
/// Labels:
/// - `kind`: Resource kind (e.g., `Cluster`)
/// - `verb`: Operation (`create`, `get`, `list`, `watch`, `update`, `patch`, `delete`)
/// - `outcome`: `success` or the error reason (e.g., `Conflict`, `NotFound`)
pub static REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requests_total"),
        "Total number of registry requests by kind, verb and outcome",
    );
    let counter = CounterVec::new(opts, &["kind", "verb", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of registry requests in seconds
///
/// Labels:
/// - `kind`: Resource kind
/// - `verb`: Operation
pub static REQUEST_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_request_duration_seconds"),
        "Duration of registry requests in seconds by kind and verb",
    )
    .buckets(vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["kind", "verb"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Validation Metrics
// ============================================================================

/// Total number of objects rejected by validation
///
/// Labels:
/// - `kind`: Resource kind
/// - `verb`: Operation that was rejected
pub static VALIDATION_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_validation_failures_total"),
        "Total number of objects rejected by validation by kind and verb",
    );
    let counter = CounterVec::new(opts, &["kind", "verb"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Watch Metrics
// ============================================================================

/// Number of watch streams currently open
///
/// Labels:
/// - `kind`: Resource kind
pub static WATCHES_ACTIVE: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watches_active"),
        "Number of open watch streams by kind",
    );
    let gauge = GaugeVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record one completed request
///
/// # Arguments
/// * `kind` - Resource kind (e.g., `Cluster`)
/// * `verb` - Operation name (e.g., `update`)
/// * `outcome` - `success` or an error reason
/// * `duration` - Time spent serving the request
pub fn record_request(kind: &str, verb: &str, outcome: &str, duration: Duration) {
    REQUESTS_TOTAL
        .with_label_values(&[kind, verb, outcome])
        .inc();
    REQUEST_DURATION_SECONDS
        .with_label_values(&[kind, verb])
        .observe(duration.as_secs_f64());
}

/// Record the result of a request, deriving the outcome label from it.
pub fn record_result<T>(kind: &str, verb: &str, result: &Result<T, RegistryError>, duration: Duration) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.reason(),
    };
    record_request(kind, verb, outcome, duration);
    if matches!(result, Err(RegistryError::Invalid { .. })) {
        VALIDATION_FAILURES_TOTAL
            .with_label_values(&[kind, verb])
            .inc();
    }
}

/// Record a watch stream opening
pub fn record_watch_started(kind: &str) {
    WATCHES_ACTIVE.with_label_values(&[kind]).inc();
}

/// Record a watch stream closing
pub fn record_watch_stopped(kind: &str) {
    WATCHES_ACTIVE.with_label_values(&[kind]).dec();
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
