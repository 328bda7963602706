// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Unit tests for bundle/ignore_resources.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::bundle::GeneratorError;
    use crate::crd::IgnoreResource;

    fn entry(kind: &str, name: &str, namespace: Option<&str>) -> IgnoreResource {
        IgnoreResource {
            name: name.to_string(),
            kind: kind.to_string(),
            api_version: None,
            namespace: namespace.map(ToString::to_string),
        }
    }

    #[test]
    fn test_configmap_patch() {
        let patch = compare_patch(&entry("ConfigMap", "cm-1", None), "apps").unwrap();
        assert_eq!(patch.api_version, "v1");
        assert_eq!(patch.namespace.as_deref(), Some("apps"));
        let paths: Vec<&str> = patch.operations.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["/metadata/annotations", "/data"]);
    }

    #[test]
    fn test_validating_webhook_patch() {
        let patch =
            compare_patch(&entry("ValidatingWebhookConfiguration", "vw1", None), "apps").unwrap();
        assert_eq!(patch.api_version, "admissionregistration.k8s.io/v1");
        assert!(patch.namespace.is_none());
        assert_eq!(patch.operations.len(), 1);
        assert_eq!(patch.operations[0].op, "remove");
        assert_eq!(patch.operations[0].path, "/webhooks");
    }

    #[test]
    fn test_cluster_scoped_kind_rejects_namespace() {
        let result = compare_patch(
            &entry("ValidatingWebhookConfiguration", "vw1", Some("ns-1")),
            "apps",
        );
        match result {
            Err(GeneratorError::Config(msg)) => {
                assert_eq!(
                    msg,
                    "namespace is not supported for ValidatingWebhookConfiguration"
                );
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_crd_rejects_namespace() {
        let result = compare_patch(&entry("CustomResourceDefinition", "crd-1", Some("ns")), "");
        assert!(matches!(result, Err(GeneratorError::Config(_))));
    }

    #[test]
    fn test_secret_patch_removes_data_and_metadata() {
        let patch = compare_patch(&entry("Secret", "s-1", Some("other")), "apps").unwrap();
        assert_eq!(patch.namespace.as_deref(), Some("other"));
        let paths: Vec<&str> = patch.operations.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["/data", "/metadata"]);
    }

    #[test]
    fn test_workload_patches_remove_pod_template() {
        for (kind, api_version) in [("Deployment", "apps/v1"), ("Job", "batch/v1")] {
            let patch = compare_patch(&entry(kind, "w-1", None), "apps").unwrap();
            assert_eq!(patch.api_version, api_version);
            assert_eq!(patch.operations[0].path, "/spec/template/spec");
        }
    }

    #[test]
    fn test_envoy_filter_patch() {
        let patch = compare_patch(&entry("EnvoyFilter", "ef-1", None), "istio-system").unwrap();
        assert_eq!(patch.api_version, "networking.istio.io/v1beta1");
        assert_eq!(patch.operations[0].path, "/spec/configPatches");
    }

    #[test]
    fn test_api_version_override_honored() {
        let mut resource = entry("EnvoyFilter", "ef-1", None);
        resource.api_version = Some("networking.istio.io/v1alpha3".to_string());
        let patch = compare_patch(&resource, "apps").unwrap();
        assert_eq!(patch.api_version, "networking.istio.io/v1alpha3");
    }

    #[test]
    fn test_unknown_kind_fails() {
        let result = compare_patch(&entry("DaemonSet", "ds-1", None), "apps");
        match result {
            Err(GeneratorError::Config(msg)) => {
                assert!(msg.contains("unsupported ignoreResources kind DaemonSet"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
