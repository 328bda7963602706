// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Common label, annotation and finalizer constants used across all reconcilers.
//!
//! These strings form the wire contract with the orchestration platform and the
//! CD engine; changing any of them breaks correlation with existing resources.

// ============================================================================
// App Orchestration Labels
// ============================================================================

/// Label carrying the application name on generated bundles and bindings
pub const LABEL_APP_NAME: &str = "app.edge-orchestrator.intel.com/app-name";

/// Label carrying the deterministic bundle name
pub const LABEL_BUNDLE_NAME: &str = "app.edge-orchestrator.intel.com/bundle-name";

/// Label distinguishing app bundles from namespace-bootstrap (`init`) bundles
pub const LABEL_BUNDLE_TYPE: &str = "app.edge-orchestrator.intel.com/bundle-type";

/// Label carrying the owning deployment id
pub const LABEL_DEPLOYMENT_ID: &str = "app.edge-orchestrator.intel.com/deployment-id";

/// Label carrying the owning project id
pub const LABEL_PROJECT_ID: &str = "app.edge-orchestrator.intel.com/project-id";

/// Label carrying the tenancy-active project id on app-orch resources
pub const LABEL_ACTIVE_PROJECT_ID: &str = "app.edge-orchestrator.intel.com/active-project-id";

// ============================================================================
// Cluster Orchestration Labels
// ============================================================================

/// Project-id label stamped by the cluster orchestrator on `FleetCluster` records
pub const LABEL_CLUSTER_ORCH_PROJECT_ID: &str = "edge-orchestrator.intel.com/project-id";

/// Human-readable cluster name label stamped by the cluster orchestrator
pub const LABEL_CLUSTER_NAME: &str = "edge-orchestrator.intel.com/clustername";

/// Host UUID label stamped by the cluster orchestrator, passed through to
/// charts via fleet-globals
pub const LABEL_HOST_UUID: &str = "edge-orchestrator.intel.com/host-uuid";

// ============================================================================
// CD Engine (Fleet) Labels
// ============================================================================

/// Fleet label identifying the target cluster on a `BundleDeployment`
pub const LABEL_FLEET_CLUSTER: &str = "fleet.cattle.io/cluster";

/// Fleet label identifying the target cluster namespace on a `BundleDeployment`
pub const LABEL_FLEET_CLUSTER_NAMESPACE: &str = "fleet.cattle.io/cluster-namespace";

/// Generation hint stamped on bundles so aggregation can detect stale rollouts
pub const LABEL_DEPLOYMENT_GENERATION: &str = "deploymentGeneration";

// ============================================================================
// Label Values
// ============================================================================

/// `bundle-type` value for application bundles
pub const BUNDLE_TYPE_APP: &str = "app";

/// `bundle-type` value for namespace-bootstrap bundles
pub const BUNDLE_TYPE_INIT: &str = "init";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer guarding child-deployment parent-list cleanup
pub const FINALIZER_DEPENDENCY: &str = "app.edge-orchestrator.intel.com/dependency";

/// Finalizer guarding remote Git repository deletion
pub const FINALIZER_GIT_REMOTE: &str = "app.edge-orchestrator.intel.com/git-remote";

/// Finalizer guarding catalog `isDeployed` bookkeeping
pub const FINALIZER_CATALOG: &str = "app.edge-orchestrator.intel.com/catalog";
