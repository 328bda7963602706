// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Mapping of `ignoreResources` entries to drift-detection comparePatches.
//!
//! The supported kinds are a closed set; an unknown kind fails generation so
//! a typo surfaces in the deployment status instead of silently leaving the
//! resource under drift detection.

use super::fleet_yaml::{ComparePatch, PatchOperation};
use super::GeneratorError;
use crate::crd::IgnoreResource;

/// Kinds without a namespace; an entry carrying one is a configuration error.
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "ValidatingWebhookConfiguration",
    "MutatingWebhookConfiguration",
    "CustomResourceDefinition",
];

/// Build the comparePatch for one `ignoreResources` entry.
///
/// Namespaced kinds default to the app's namespace when the entry does not
/// carry one.
///
/// # Errors
///
/// Fails for unsupported kinds and for cluster-scoped kinds with a namespace.
pub fn compare_patch(
    resource: &IgnoreResource,
    default_namespace: &str,
) -> Result<ComparePatch, GeneratorError> {
    let kind = resource.kind.as_str();

    if CLUSTER_SCOPED_KINDS.contains(&kind) && resource.namespace.is_some() {
        return Err(GeneratorError::Config(format!(
            "namespace is not supported for {kind}"
        )));
    }

    let (default_api_version, operations, namespaced): (&str, Vec<PatchOperation>, bool) =
        match kind {
            "ConfigMap" => (
                "v1",
                vec![
                    PatchOperation::remove("/metadata/annotations"),
                    PatchOperation::remove("/data"),
                ],
                true,
            ),
            "ValidatingWebhookConfiguration" | "MutatingWebhookConfiguration" => (
                "admissionregistration.k8s.io/v1",
                vec![PatchOperation::remove("/webhooks")],
                false,
            ),
            "Secret" => (
                "v1",
                vec![
                    PatchOperation::remove("/data"),
                    PatchOperation::remove("/metadata"),
                ],
                true,
            ),
            "CustomResourceDefinition" => (
                "apiextensions.k8s.io/v1",
                vec![PatchOperation::remove("/spec")],
                false,
            ),
            "EnvoyFilter" => (
                "networking.istio.io/v1beta1",
                vec![PatchOperation::remove("/spec/configPatches")],
                true,
            ),
            "Deployment" => (
                "apps/v1",
                vec![PatchOperation::remove("/spec/template/spec")],
                true,
            ),
            "Job" => (
                "batch/v1",
                vec![PatchOperation::remove("/spec/template/spec")],
                true,
            ),
            other => {
                return Err(GeneratorError::Config(format!(
                    "unsupported ignoreResources kind {other}"
                )))
            }
        };

    let namespace = if namespaced {
        Some(
            resource
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| default_namespace.to_string()),
        )
    } else {
        None
    };

    Ok(ComparePatch {
        kind: kind.to_string(),
        api_version: resource
            .api_version
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default_api_version.to_string()),
        namespace,
        name: resource.name.clone(),
        operations,
    })
}

#[cfg(test)]
#[path = "ignore_resources_tests.rs"]
mod ignore_resources_tests;
