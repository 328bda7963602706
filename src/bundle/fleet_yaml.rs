// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Serialized shapes of the generated GitOps configs.
//!
//! These structs define the on-disk YAML contract with the CD engine:
//! `fleet.yaml`, `fleet-globals.yaml`, `kustomization.yaml`, the network
//! policies and the pre-hook image secret. Field names and omission rules
//! must stay stable; the CD engine parses these files verbatim.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use uuid::Uuid;

use crate::crd::Application;

/// Characters of the v5 UUID kept in a bundle name.
///
/// Bundle names key the CD engine's bundle identity; changing this constant
/// flips every bundle id and forces a full redeploy of everything.
pub const TRUNCATED_UUID_LEN: usize = 16;

/// Deterministic bundle name for one application of one deployment.
///
/// The identity token is the app name, optionally its version (when
/// `redeployAfterUpdate` is set, so version bumps change identity), and the
/// deployment name. The token is sha1-hashed, hex-encoded and folded into a
/// v5 UUID, of which the first [`TRUNCATED_UUID_LEN`] characters are kept.
#[must_use]
pub fn bundle_name(app: &Application, deployment_name: &str) -> String {
    let mut token = app.name.clone();
    if app.redeploy_after_update.unwrap_or(false) {
        token.push_str(&app.version);
    }
    token.push_str(deployment_name);

    let digest = Sha1::digest(token.as_bytes());
    let mut hex = String::with_capacity(40);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }

    let id = Uuid::new_v5(&Uuid::nil(), hex.as_bytes());
    format!("b-{}", &id.to_string()[..TRUNCATED_UUID_LEN])
}

/// Fold an `oci://` repo into the chart address.
///
/// Returns `(repo, chart)` for the helm block: OCI repositories require the
/// full chart path in `chart` and an empty `repo`; anything else passes
/// through verbatim.
#[must_use]
pub fn helm_addresses(repo: &str, chart: &str) -> (String, String) {
    if repo.starts_with("oci://") {
        let chart = format!("{}/{}", repo.trim_end_matches('/'), chart);
        (String::new(), chart)
    } else {
        (repo.to_string(), chart.to_string())
    }
}

/// The per-bundle `fleet.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetConfig {
    /// Bundle name (see [`bundle_name`])
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    pub default_namespace: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmBlock>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kustomize: Option<KustomizeBlock>,

    /// Sibling bundles that must be ready before this one rolls out
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependsOnItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffOptions>,

    /// Labels stamped on the bundle's created namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespace_labels: BTreeMap<String, String>,

    /// Annotations stamped on the bundle's created namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespace_annotations: BTreeMap<String, String>,
}

/// Helm chart block of a `fleet.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmBlock {
    pub release_name: String,
    pub repo: String,
    pub chart: String,
    pub version: String,
    pub values_files: Vec<String>,
}

/// Kustomize directory pointer in a `fleet.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KustomizeBlock {
    pub dir: String,
}

/// One `dependsOn` entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOnItem {
    pub name: String,
}

/// Drift-detection overrides in a `fleet.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compare_patches: Vec<ComparePatch>,
}

/// A per-resource diff exclusion.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparePatch {
    pub kind: String,
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<PatchOperation>,
}

/// A JSON-patch operation within a [`ComparePatch`]; always `remove` here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
}

impl PatchOperation {
    #[must_use]
    pub fn remove(path: &str) -> Self {
        PatchOperation {
            op: "remove".to_string(),
            path: path.to_string(),
        }
    }
}

/// `fleet-globals.yaml`: values passed to every chart.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraValues {
    pub global: GlobalValues,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalValues {
    pub fleet: FleetGlobals,
}

/// The `global.fleet` value block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetGlobals {
    /// Current deployment generation; aggregation reads it back from the
    /// CD engine's bundle labels to detect stale rollouts
    pub deployment_generation: i64,

    /// Cluster-label pass-throughs, emitted when `FLEET_ADD_GLOBAL_VARS` is
    /// set (newer CD engine versions no longer inject them automatically)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_labels: Option<BTreeMap<String, String>>,
}

/// `kustomize/kustomization.yaml`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_generator: Option<Vec<SecretArgs>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_options: Option<GeneratorOptions>,
}

impl Default for Kustomization {
    fn default() -> Self {
        Kustomization {
            api_version: "kustomize.config.k8s.io/v1beta1".to_string(),
            kind: "Kustomization".to_string(),
            resources: Vec::new(),
            secret_generator: None,
            generator_options: None,
        }
    }
}

/// One kustomize secretGenerator entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretArgs {
    pub name: String,
    pub namespace: String,
    pub literals: Vec<String>,
    pub r#type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    pub disable_name_suffix_hash: bool,
}

/// Minimal object metadata for generated manifests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Generated default-deny-exempt NetworkPolicy manifest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMeta,
    pub spec: PolicySpec,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    pub pod_selector: PodSelector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<PolicyRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<PolicyRule>,
}

/// Empty selector matches all pods.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
}

/// An empty rule allows all traffic in its direction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Vec<PolicyPeer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<PolicyPeer>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPeer {
    pub pod_selector: PodSelector,
}

/// Allow-all NetworkPolicy in one direction.
#[must_use]
pub fn allow_all_policy(name: &str, direction: PolicyDirection) -> NetworkPolicy {
    let mut spec = PolicySpec {
        pod_selector: PodSelector::default(),
        ..PolicySpec::default()
    };
    match direction {
        PolicyDirection::Ingress => {
            spec.policy_types = vec!["Ingress".to_string()];
            spec.ingress = vec![PolicyRule::default()];
        }
        PolicyDirection::Egress => {
            spec.policy_types = vec!["Egress".to_string()];
            spec.egress = vec![PolicyRule::default()];
        }
    }
    NetworkPolicy {
        api_version: "networking.k8s.io/v1".to_string(),
        kind: "NetworkPolicy".to_string(),
        metadata: ManifestMeta {
            name: name.to_string(),
            namespace: None,
        },
        spec,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyDirection {
    Ingress,
    Egress,
}

/// Generated pre-hook image pull secret manifest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretManifest {
    pub api_version: String,
    pub kind: String,
    pub r#type: String,
    pub metadata: ManifestMeta,
    /// Values are base64-encoded, per the Kubernetes Secret contract
    pub data: BTreeMap<String, String>,
}

#[cfg(test)]
#[path = "fleet_yaml_tests.rs"]
mod fleet_yaml_tests;
