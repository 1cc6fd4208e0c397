// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the instancemgr operator.
//!
//! This module provides the metrics registry with the namespace prefix
//! `instancemgr_keikoproj_io_` (prometheus-safe version of
//! "instancemgr.keikoproj.io"). The registry is process-global; whatever
//! serves `/metrics` encodes it with [`gather_metrics`].

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all instancemgr metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "instancemgr_keikoproj_io";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Total number of reconciliations by terminal state and outcome
///
/// Labels:
/// - `state`: reconcile state the pass ended in (e.g. `Ready`, `Error`)
/// - `outcome`: `success` or `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by state and outcome",
    );
    let counter = CounterVec::new(opts, &["state", "outcome"])
        .expect("reconciliations_total metric definition is valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("reconciliations_total registers once");
    counter
});

/// Reconciliation duration in seconds, by outcome
pub static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Reconciliation duration in seconds",
    );
    let histogram = HistogramVec::new(opts, &["outcome"])
        .expect("reconciliation_duration metric definition is valid");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("reconciliation_duration registers once");
    histogram
});

/// Instances terminated by the rolling updater
pub static INSTANCES_ROTATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_instances_rotated_total"),
        "Instances terminated by the rolling updater",
    );
    let counter = CounterVec::new(opts, &["group"])
        .expect("instances_rotated_total metric definition is valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("instances_rotated_total registers once");
    counter
});

/// Record one finished reconciliation.
pub fn record_reconciliation(state: &str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "error" };
    RECONCILIATION_TOTAL
        .with_label_values(&[state, outcome])
        .inc();
    RECONCILIATION_DURATION
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record instances terminated during rotation.
pub fn record_rotation(group: &str, count: usize) {
    INSTANCES_ROTATED_TOTAL
        .with_label_values(&[group])
        .inc_by(count as f64);
}

/// Encode the registry in the Prometheus text format.
#[must_use]
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
