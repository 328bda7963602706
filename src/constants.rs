// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Global constants for the Admiral operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all app-orchestration CRDs
pub const API_GROUP: &str = "app.edge-orchestrator.intel.com";

/// API version for all app-orchestration CRDs
pub const API_VERSION: &str = "v1beta1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "app.edge-orchestrator.intel.com/v1beta1";

/// Kind name for `Deployment` resource
pub const KIND_DEPLOYMENT: &str = "Deployment";

/// Kind name for `DeploymentCluster` resource
pub const KIND_DEPLOYMENT_CLUSTER: &str = "DeploymentCluster";

/// Kind name for `Cluster` resource
pub const KIND_CLUSTER: &str = "Cluster";

/// API group/version of the CD engine's resources
pub const FLEET_API_GROUP_VERSION: &str = "fleet.cattle.io/v1alpha1";

/// Kind name for the CD engine's `GitRepo` resource
pub const KIND_GIT_REPO: &str = "GitRepo";

// ============================================================================
// Condition Types
// ============================================================================

/// Overall readiness of a resource
pub const CONDITION_READY: &str = "Ready";

/// Remote Git repository matches the deployment spec
pub const CONDITION_GIT_SYNCED: &str = "GitSynced";

/// All `GitRepo` bindings match the deployment spec
pub const CONDITION_GIT_REPOS_UPDATED: &str = "GitReposUpdated";

/// No binding is stuck in a failed poll job
pub const CONDITION_NOT_STALLED: &str = "NotStalled";

/// Fleet-side condition marking a stalled bundle rollout
pub const CONDITION_STALLED: &str = "Stalled";

// ============================================================================
// Condition Reasons
// ============================================================================

/// Reason recorded when a reconcile phase completed successfully
pub const REASON_SUCCESS: &str = "Success";

/// Reason recorded when a reconcile phase failed
pub const REASON_FAILED: &str = "Failed";

/// Git client construction failed (credentials or configuration)
pub const REASON_NEW_GIT_CLIENT_FAILED: &str = "NewGitClientFailed";

/// Remote existence probe failed
pub const REASON_GIT_REMOTE_CHECK_FAILED: &str = "GitRemoteCheckFailed";

/// Shallow clone of the remote failed
pub const REASON_GIT_CLONE_FAILED: &str = "GitCloneFailed";

/// Local repository initialization failed
pub const REASON_GIT_INITIALIZATION_FAILED: &str = "GitInitializationFailed";

/// Fleet config generation failed
pub const REASON_FLEET_CONFIG_FAILED: &str = "FleetConfigFailed";

/// Commit of generated configs failed
pub const REASON_GIT_COMMIT_FAILED: &str = "GitCommitFailed";

/// Push to the remote failed
pub const REASON_GIT_PUSH_FAILED: &str = "GitPushFailed";

/// `GitRepo` binding create/update/delete failed
pub const REASON_GIT_REPO_UPDATE_FAILED: &str = "GitRepoUpdateFailed";

/// All bundle deployments on a cluster are ready
pub const REASON_BUNDLE_DEPLOYMENTS_READY: &str = "BundleDeploymentsReady";

/// At least one bundle deployment on a cluster is not ready
pub const REASON_BUNDLE_DEPLOYMENTS_NOT_READY: &str = "BundleDeploymentsNotReady";

/// The referenced cluster stopped heartbeating
pub const REASON_CLUSTER_STATUS_UNKNOWN: &str = "ClusterStatusUnknown";

// ============================================================================
// Timing Constants
// ============================================================================

/// Requeue duration after a reconcile error (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration when a resource is Ready (5 minutes)
pub const READY_REQUEUE_DURATION_SECS: u64 = 300;

/// Cap on the controller's exponential error backoff (5 minutes)
pub const MAX_ERROR_BACKOFF_SECS: u64 = 300;

/// Minimum interval between force-resyncs of stuck bundles (60 seconds)
pub const FORCE_RESYNC_INTERVAL_SECS: i64 = 60;

/// A `DeploymentCluster` counts as Running only after its Ready condition has
/// held for this long (10 seconds)
pub const READY_WAIT_SECS: i64 = 10;

/// Grace period before an empty target-cluster set becomes `NoTargetClusters`
/// (5 minutes)
pub const NO_TARGET_CLUSTERS_WAIT_SECS: i64 = 300;

/// Default fleet agent checkin interval in minutes
pub const DEFAULT_FLEET_AGENT_CHECKIN_MINUTES: u64 = 15;

/// Default polling interval handed to generated `GitRepo` bindings
pub const DEFAULT_GIT_POLLING_INTERVAL: &str = "15s";

/// TTL for cached deployment metadata (30 minutes)
pub const METADATA_CACHE_TTL_SECS: u64 = 1800;

// ============================================================================
// Git Constants
// ============================================================================

/// Commit author for generated fleet configs
pub const GIT_COMMIT_AUTHOR_NAME: &str = "App Deployment Manager";

/// Commit author email for generated fleet configs
pub const GIT_COMMIT_AUTHOR_EMAIL: &str = "adm@app-orch.com";

/// Commit message for generated fleet configs
pub const GIT_COMMIT_MESSAGE: &str = "Generated Fleet configs";

/// Secret name holding git credentials for `GitRepo` bindings
pub const FLEET_GIT_SECRET_NAME: &str = "fleet-gitrepo-cred";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 9090;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
