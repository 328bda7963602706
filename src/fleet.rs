// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! External CD-engine (`fleet.cattle.io`) resource types.
//!
//! These kinds are owned by the CD engine; only the fields this operator
//! reads or writes are declared. [`GitRepo`] is written by the deployment
//! reconciler, [`BundleDeployment`] and the fleet [`Cluster`] are read-only
//! inputs.
//!
//! The fleet `Cluster` kind shares its name with [`crate::crd::Cluster`];
//! always refer to it module-qualified (`fleet::Cluster`).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crd::Condition;

/// Cluster selector on a [`GitRepo`] target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSelector {
    /// Labels a cluster must carry to match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
}

/// One targeting rule on a [`GitRepo`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitTarget {
    /// Optional rule name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Clusters this rule selects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_selector: Option<ClusterSelector>,
}

/// `GitRepo` binds paths of a Git repository to target clusters so the CD
/// engine can deliver them. One exists per application per deployment, named
/// `<app>-<deployment-id>` and owned by the Deployment.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.cattle.io",
    version = "v1alpha1",
    kind = "GitRepo",
    namespaced,
    doc = "GitRepo tells the CD engine which paths of which repository deploy to which clusters."
)]
#[kube(status = "GitRepoStatus")]
#[serde(rename_all = "camelCase")]
pub struct GitRepoSpec {
    /// Repository URL
    pub repo: String,

    /// Branch to poll; the CD engine's default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Paths within the repository to deliver
    #[serde(default)]
    pub paths: Vec<String>,

    /// Targeting rules
    #[serde(default)]
    pub targets: Vec<GitTarget>,

    /// Poll interval (duration string, e.g. "15s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<String>,

    /// Secret holding git credentials for polling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_name: Option<String>,

    /// Secret holding helm-repository credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm_secret_name: Option<String>,

    /// PEM CA bundle for the git server, base64-encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,

    /// Incrementing this forces the CD engine to re-sync the repository
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_sync_generation: Option<i64>,
}

/// Human-oriented sync summary on a [`GitRepo`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRepoDisplay {
    /// Most recent sync error, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `GitRepo` status (read-only here).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitRepoStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub display: GitRepoDisplay,

    /// Commit the CD engine last synced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    /// Generation the CD engine last observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Human-oriented rollout summary on a bundle deployment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleDeploymentDisplay {
    /// Rollout state string ("Ready", "Modified", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// `BundleDeployment` status (read-only here).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleDeploymentStatus {
    /// True when the deployed resources are ready
    #[serde(default)]
    pub ready: bool,

    /// True when no deployed resource drifted from the bundle
    #[serde(default)]
    pub non_modified: bool,

    /// Id of the bundle content actually applied
    #[serde(rename = "appliedDeploymentID", skip_serializing_if = "Option::is_none")]
    pub applied_deployment_id: Option<String>,

    #[serde(default)]
    pub display: BundleDeploymentDisplay,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `BundleDeployment` is the CD engine's per-cluster realization of a bundle.
///
/// Its labels convey `deployment-id`, `app-name`, the fleet cluster id and
/// namespace, `bundle-type` and a `deploymentGeneration` hint; the
/// deployment-cluster reconciler projects these into [`crate::crd::DeploymentCluster`]
/// rows.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.cattle.io",
    version = "v1alpha1",
    kind = "BundleDeployment",
    namespaced,
    doc = "BundleDeployment is the CD engine's per-cluster realization of a bundle."
)]
#[kube(status = "BundleDeploymentStatus")]
#[serde(rename_all = "camelCase")]
pub struct BundleDeploymentSpec {
    /// Id of the bundle content currently desired
    #[serde(rename = "deploymentID", skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,

    /// Id of the bundle content staged for rollout
    #[serde(rename = "stagedDeploymentID", skip_serializing_if = "Option::is_none")]
    pub staged_deployment_id: Option<String>,
}

/// Fleet agent heartbeat block on the fleet cluster record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    /// Timestamp of the agent's last heartbeat (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,

    /// Namespace the agent reports from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Fleet-side rollout summary on the fleet cluster record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FleetClusterDisplay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_bundles: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Fleet `Cluster` status (read-only here).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub agent: AgentStatus,

    #[serde(default)]
    pub display: FleetClusterDisplay,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The CD engine's `Cluster` record: one per registered edge cluster.
///
/// Carries the agent heartbeat that drives cluster-liveness detection and the
/// cluster-orchestrator labels mirrored into [`crate::crd::Cluster`].
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleet.cattle.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced,
    doc = "Cluster is the CD engine's record of a registered downstream cluster."
)]
#[kube(status = "ClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Secret holding the downstream cluster's kubeconfig
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_config_secret: Option<String>,
}

#[cfg(test)]
#[path = "fleet_tests.rs"]
mod fleet_tests;
