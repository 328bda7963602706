// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for application deployment management.
//!
//! This module defines the Kubernetes Custom Resource Definitions owned by the
//! Admiral operator.
//!
//! # Resource Types
//!
//! - [`Deployment`] - User intent: a deployment package plus a list of
//!   applications and target-cluster selectors
//! - [`DeploymentCluster`] - Synthesized per `(deployment, target cluster)`
//!   status row, projected from the CD engine's bundle deployments
//! - [`Cluster`] - Internal mirror of a remote edge cluster's liveness
//!
//! # Example: Creating a Deployment spec
//!
//! ```rust,no_run
//! use admiral::crd::{Application, DeploymentPackageRef, DeploymentSpec, DeploymentType, HelmApp};
//!
//! let spec = DeploymentSpec {
//!     display_name: "wordpress".to_string(),
//!     project: "acme".to_string(),
//!     deployment_package_ref: DeploymentPackageRef {
//!         name: "wordpress".to_string(),
//!         version: "0.1.0".to_string(),
//!         profile_name: Some("default".to_string()),
//!         forbids_multiple_deployments: None,
//!         namespaces: None,
//!     },
//!     applications: vec![Application {
//!         name: "wordpress".to_string(),
//!         version: "15.2.42".to_string(),
//!         helm_app: Some(HelmApp {
//!             chart: "wordpress".to_string(),
//!             version: "15.2.42".to_string(),
//!             repo: "https://charts.bitnami.com/bitnami".to_string(),
//!             repo_secret_name: None,
//!             image_registry: None,
//!             image_registry_secret_name: None,
//!         }),
//!         ..Application::default()
//!     }],
//!     deployment_type: DeploymentType::AutoScaling,
//!     child_deployment_list: None,
//!     network_ref: None,
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate state of a deployment, cluster or deployment-cluster.
///
/// Serialized values are part of the platform contract and must not change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum StateType {
    /// First rollout in progress
    Deploying,
    /// Rollout of a spec update in progress
    Updating,
    /// All apps running on all target clusters
    Running,
    /// At least one app is not running
    Down,
    /// A bundle rollout is stalled
    Error,
    /// The operator itself failed (git job, config generation)
    InternalError,
    /// Target-cluster liveness cannot be determined
    Unknown,
    /// Deletion in progress
    Terminating,
    /// No cluster matches the deployment's target selectors
    NoTargetClusters,
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StateType::Deploying => "Deploying",
            StateType::Updating => "Updating",
            StateType::Running => "Running",
            StateType::Down => "Down",
            StateType::Error => "Error",
            StateType::InternalError => "InternalError",
            StateType::Unknown => "Unknown",
            StateType::Terminating => "Terminating",
            StateType::NoTargetClusters => "NoTargetClusters",
        };
        f.write_str(s)
    }
}

/// How target clusters are selected for a deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeploymentType {
    /// Deploy to every cluster matching the selectors, present and future
    #[serde(rename = "auto-scaling")]
    AutoScaling,
    /// Deploy to explicitly targeted clusters only
    #[serde(rename = "targeted")]
    Targeted,
}

/// A Kubernetes-style status condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Types used here: Ready, GitSynced, GitReposUpdated, NotStalled.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Reference to a versioned, project-scoped deployment package in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPackageRef {
    /// Catalog package name
    pub name: String,

    /// Catalog package version
    pub version: String,

    /// Selected deployment profile within the package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,

    /// When true, the package may be deployed at most once per project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forbids_multiple_deployments: Option<bool>,

    /// Namespaces the package declares; each gets a bootstrap bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<PackageNamespace>>,
}

/// A namespace declared by a deployment package, created on target clusters
/// by a namespace-bootstrap bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackageNamespace {
    /// Namespace name
    pub name: String,

    /// Labels applied to the created namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Annotations applied to the created namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Helm chart descriptor for one application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmApp {
    /// Chart name
    pub chart: String,

    /// Chart version
    pub version: String,

    /// Chart repository URL; `oci://` repositories are folded into the chart path
    pub repo: String,

    /// Secret holding chart-repository credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_secret_name: Option<String>,

    /// Image registry URL substituted for `%ImageRegistryURL%`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_registry: Option<String>,

    /// Secret holding image-registry credentials; required whenever a profile
    /// or override references `%GeneratedDockerCredential%`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_registry_secret_name: Option<String>,
}

/// A runtime resource excluded from the CD engine's drift detection.
///
/// Each entry maps to a kind-specific JSON comparePatch in the generated fleet
/// config; the supported kinds are a closed set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreResource {
    /// Resource name
    pub name: String,

    /// Resource kind; must be one of the supported kinds
    pub kind: String,

    /// Override for the kind's default apiVersion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Resource namespace; rejected for cluster-scoped kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One application within a deployment package.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application name; unique within the deployment
    pub name: String,

    /// Application version
    pub version: String,

    /// Default namespace the app's workloads deploy into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Cluster-label selectors; each entry targets every cluster carrying all
    /// of its labels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<BTreeMap<String, String>>>,

    /// Helm chart descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm_app: Option<HelmApp>,

    /// Secret holding the selected profile's values (`profile.yaml`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_secret_name: Option<String>,

    /// Secret holding user override values (`overrides.yaml`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_secret_name: Option<String>,

    /// Names of sibling applications that must be rolled out first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,

    /// When true, the app's bundle identity includes its version so version
    /// bumps force a redeploy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeploy_after_update: Option<bool>,

    /// Resources excluded from drift detection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_resources: Option<Vec<IgnoreResource>>,

    /// Annotate the app's service objects for cross-cluster export
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_service_export: Option<bool>,

    /// Extra labels applied to the app's namespace by the bootstrap bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_labels: Option<BTreeMap<String, String>>,

    /// Application-level package dependencies, keyed by package name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_deployment_packages: Option<BTreeMap<String, DeploymentPackageRef>>,
}

/// Reference held by a parent deployment to one of its children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DependentDeploymentRef {
    /// The child's deployment package
    pub deployment_package_ref: DeploymentPackageRef,

    /// Name of the child Deployment resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
}

/// Per-state counts aggregated over apps or clusters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Total number of entities
    #[serde(default)]
    pub total: i32,

    /// Entities in Running state
    #[serde(default)]
    pub running: i32,

    /// Entities in Down state
    #[serde(default)]
    pub down: i32,

    /// Entities in Unknown state
    #[serde(default)]
    pub unknown: i32,

    /// What the counts enumerate (e.g. "cluster", "app")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

/// `Deployment` converts a deployment package plus target selectors into
/// per-application GitOps bundles delivered by the CD engine.
///
/// The resource name is the deployment id: an opaque, immutable identifier
/// that keys the per-deployment Git repository, the `GitRepo` bindings and
/// the deterministic `DeploymentCluster` names.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.edge-orchestrator.intel.com",
    version = "v1beta1",
    kind = "Deployment",
    namespaced,
    doc = "Deployment declares a set of applications from a catalog deployment package, to be delivered to every cluster matching the target selectors."
)]
#[kube(status = "DeploymentStatus")]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Human-readable deployment name
    pub display_name: String,

    /// Owning project
    pub project: String,

    /// The catalog package this deployment instantiates
    pub deployment_package_ref: DeploymentPackageRef,

    /// Applications to deploy, in declaration order
    #[serde(default)]
    pub applications: Vec<Application>,

    /// Cluster targeting mode
    pub deployment_type: DeploymentType,

    /// Child deployments this deployment depends on, keyed by child name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_deployment_list: Option<BTreeMap<String, DependentDeploymentRef>>,

    /// Reference to an interconnect network for cross-cluster services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_ref: Option<String>,
}

/// `Deployment` status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    /// Aggregate state (see the state machine in the reconciler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateType>,

    /// Most specific failure message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Per-target-cluster counts
    #[serde(default)]
    pub summary: Summary,

    /// Generation of the last clean reconcile; equals `metadata.generation`
    /// iff every phase of the last reconcile succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled_generation: Option<i64>,

    /// True from first reconcile until aggregation observes Running everywhere
    #[serde(default)]
    pub deploy_in_progress: bool,

    /// Timestamp of the last force-resync pass (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_force_resync: Option<String>,

    /// Parent deployments referencing this one, keyed by parent name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_deployment_list: Option<BTreeMap<String, DeploymentPackageRef>>,

    /// Last time this status block was recomputed (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_update: Option<String>,

    /// Generation observed by the status writer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// "Clusters: t/r/d/u, Apps: n" summary string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// One application's aggregated state on one target cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct App {
    /// Application name
    pub name: String,

    /// Bundle id the CD engine assigned to this app
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Running or Down, derived from the bundle deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateType>,

    /// Failed-condition messages accumulated while not ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Deployment generation the bundle was stamped with
    #[serde(default)]
    pub deployment_generation: i64,
}

/// `DeploymentCluster` is a synthesized status row for one
/// `(deployment, target cluster)` pair.
///
/// It is a projection of the BundleDeployments sharing the same
/// `(deployment-id, cluster-id)` label pair and owns no other resources; it
/// deletes itself when no app bundles remain or its cluster disappears.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.edge-orchestrator.intel.com",
    version = "v1beta1",
    kind = "DeploymentCluster",
    namespaced,
    doc = "DeploymentCluster aggregates the per-application rollout state of one deployment on one target cluster."
)]
#[kube(status = "DeploymentClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct DeploymentClusterSpec {
    /// Owning deployment id
    pub deployment_id: String,

    /// Target cluster id
    pub cluster_id: String,

    /// Namespace of the target cluster's fleet records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// `DeploymentCluster` status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentClusterStatus {
    /// Display name of the referenced cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Aggregate state: Running, Down or Unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// "<running>/<total>" summary string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Per-application rows
    #[serde(default)]
    pub apps: Vec<App>,

    /// Per-app counts
    #[serde(default)]
    pub summary: Summary,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Last time this status block was recomputed (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_update: Option<String>,
}

/// `Cluster` mirrors a remote edge cluster known to the CD engine.
///
/// It is owned by the corresponding fleet cluster record and is deleted with
/// it. Its `Unknown` state (heartbeat timeout) feeds the deployment and
/// deployment-cluster aggregations.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.edge-orchestrator.intel.com",
    version = "v1beta1",
    kind = "Cluster",
    namespaced,
    doc = "Cluster mirrors a remote edge cluster's identity and agent liveness from the CD engine."
)]
#[kube(status = "ClusterStatus")]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Cluster id (the fleet cluster name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable cluster name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Secret holding the cluster's kubeconfig
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_config_secret_name: Option<String>,
}

/// Fleet agent heartbeat information mirrored into a [`Cluster`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FleetAgentStatus {
    /// Timestamp of the agent's last heartbeat (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,

    /// Namespace the agent reports from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Fleet-side rollout display mirrored into a [`Cluster`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FleetClusterDisplay {
    /// "<ready>/<total>" bundle summary reported by fleet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_bundles: Option<String>,

    /// Fleet's own state string for the cluster
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Snapshot of the fleet cluster record's status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    #[serde(default)]
    pub cluster_display: FleetClusterDisplay,

    #[serde(default)]
    pub fleet_agent_status: FleetAgentStatus,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `Cluster` status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Running, or Unknown when the agent heartbeat timed out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Last time this status block was recomputed (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_update: Option<String>,

    /// Mirror of the fleet cluster record's status
    #[serde(default)]
    pub fleet_status: FleetStatus,

    /// Generation observed by the status writer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Generation of the fleet cluster record the status was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_observed_generation: Option<i64>,
}

impl Deployment {
    /// The deployment id: the resource name, immutable for the lifetime of
    /// the deployment.
    #[must_use]
    pub fn deployment_id(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    /// Look up a condition by type.
    #[must_use]
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .and_then(|conds| conds.iter().find(|c| c.r#type == condition_type))
    }

    /// Whether the Ready condition is currently True.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.condition(crate::constants::CONDITION_READY)
            .is_some_and(|c| c.status == "True")
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
