// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Admiral operator.
//!
//! All metrics carry the `admiral_` namespace prefix and are exposed on the
//! `/metrics` endpoint served from `main`.
//!
//! Per-deployment gauges are keyed by deployment id and project id; they are
//! refreshed on every successful reconcile and removed when the deployment is
//! deleted so dashboards do not accumulate ghosts.
//!
//! # Example
//!
//! ```rust,no_run
//! use admiral::metrics::{record_reconciliation_success, set_deployment_status};
//!
//! record_reconciliation_success("Deployment", std::time::Duration::from_secs(1));
//! set_deployment_status("216e7223", "project-a", "Running");
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

use crate::crd::StateType;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all Admiral metrics
const METRICS_NAMESPACE: &str = "admiral";

/// Every state a deployment gauge can carry, for cleanup sweeps
const ALL_STATES: &[StateType] = &[
    StateType::Deploying,
    StateType::Updating,
    StateType::Running,
    StateType::Down,
    StateType::Error,
    StateType::InternalError,
    StateType::Unknown,
    StateType::Terminating,
    StateType::NoTargetClusters,
];

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry exposed via the `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: Kind of resource (`Deployment`, `DeploymentCluster`, `Cluster`)
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `resource_type`: Kind of resource
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Deployment Status Metrics
// ============================================================================

/// Current deployment state, one series per `(deployment, project, state)`
///
/// Labels:
/// - `deployment_id`: The deployment id
/// - `project_id`: The owning project
/// - `state`: Deployment state string
///
/// Value: 1 for the current state, 0 for all others.
pub static DEPLOYMENT_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_deployment_status"),
        "Current deployment state (1 = current, 0 = not current)",
    );
    let gauge = GaugeVec::new(opts, &["deployment_id", "project_id", "state"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Git Metrics
// ============================================================================

/// Total number of remote git operations by operation and status
///
/// Labels:
/// - `operation`: `exists`, `init`, `clone`, `commit`, `push`, `delete`
/// - `status`: `success`, `error`
pub static GIT_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_git_operations_total"),
        "Total number of remote git operations by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by resource type and error category
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `error_type`: Category of error (`git`, `api_error`, `config`, `catalog`)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by resource type and error category",
    );
    let counter = CounterVec::new(opts, &["resource_type", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a remote git operation outcome
pub fn record_git_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    GIT_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record an error
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Set the deployment status gauge: 1 for `state`, 0 for every other state.
pub fn set_deployment_status(deployment_id: &str, project_id: &str, state: &str) {
    for s in ALL_STATES {
        let value = if s.to_string() == state { 1.0 } else { 0.0 };
        DEPLOYMENT_STATUS
            .with_label_values(&[deployment_id, project_id, &s.to_string()])
            .set(value);
    }
}

/// Remove every status series for a deployment. Called once on deletion.
pub fn remove_deployment_status(deployment_id: &str, project_id: &str) {
    for s in ALL_STATES {
        // remove returns an error when the series never existed; ignore it
        let _ = DEPLOYMENT_STATUS.remove_label_values(&[deployment_id, project_id, &s.to_string()]);
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let resource_type = "TestDeployment";
        let duration = Duration::from_millis(500);

        record_reconciliation_success(resource_type, duration);

        let counter = RECONCILIATION_TOTAL.with_label_values(&[resource_type, "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[resource_type]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_deployment_status_single_current_state() {
        set_deployment_status("dep-1", "proj-1", "Running");

        let running = DEPLOYMENT_STATUS.with_label_values(&["dep-1", "proj-1", "Running"]);
        assert!((running.get() - 1.0).abs() < f64::EPSILON);

        let down = DEPLOYMENT_STATUS.with_label_values(&["dep-1", "proj-1", "Down"]);
        assert!(down.get().abs() < f64::EPSILON);
    }

    #[test]
    fn test_remove_deployment_status() {
        set_deployment_status("dep-2", "proj-2", "Deploying");
        remove_deployment_status("dep-2", "proj-2");

        let metrics = gather_metrics().unwrap();
        assert!(!metrics.contains("dep-2"));
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success("GatherTest", Duration::from_millis(100));

        let result = gather_metrics();
        assert!(result.is_ok(), "Gathering metrics should succeed");

        let metrics_text = result.unwrap();
        assert!(
            metrics_text.contains("admiral"),
            "Metrics should contain namespace prefix"
        );
        assert!(
            metrics_text.contains("reconciliations_total"),
            "Metrics should contain reconciliation counter"
        );
    }
}
