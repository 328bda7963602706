// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Unit tests for bundle/mod.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{
        Application, Deployment, DeploymentPackageRef, DeploymentSpec, DeploymentType, HelmApp,
        IgnoreResource,
    };
    use fleet_yaml::{bundle_name, FleetConfig};
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapSecretReader {
        values: HashMap<String, String>,
        credentials: HashMap<String, (String, String)>,
    }

    impl MapSecretReader {
        fn new() -> Self {
            MapSecretReader {
                values: HashMap::new(),
                credentials: HashMap::new(),
            }
        }

        fn with_values(mut self, name: &str, contents: &str) -> Self {
            self.values.insert(name.to_string(), contents.to_string());
            self
        }

        fn with_credentials(mut self, name: &str, username: &str, password: &str) -> Self {
            self.credentials
                .insert(name.to_string(), (username.to_string(), password.to_string()));
            self
        }
    }

    #[async_trait]
    impl SecretReader for MapSecretReader {
        async fn values(&self, _namespace: &str, name: &str) -> Result<String, GeneratorError> {
            if name.is_empty() {
                return Ok(String::new());
            }
            self.values
                .get(name)
                .cloned()
                .ok_or_else(|| GeneratorError::Secret(format!("missing secret {name}")))
        }

        async fn registry_credentials(
            &self,
            _namespace: &str,
            name: &str,
        ) -> Result<(String, String), GeneratorError> {
            self.credentials
                .get(name)
                .cloned()
                .ok_or_else(|| GeneratorError::Secret(format!("missing secret {name}")))
        }
    }

    struct StaticProjectLookup(String);

    #[async_trait]
    impl ProjectLookup for StaticProjectLookup {
        async fn registry_project_name(
            &self,
            _project_id: &str,
        ) -> Result<String, GeneratorError> {
            Ok(self.0.clone())
        }
    }

    fn helm_app() -> HelmApp {
        HelmApp {
            chart: "wordpress".to_string(),
            version: "15.2.42".to_string(),
            repo: "https://charts.bitnami.com/bitnami".to_string(),
            repo_secret_name: None,
            image_registry: None,
            image_registry_secret_name: None,
        }
    }

    fn application(name: &str) -> Application {
        Application {
            name: name.to_string(),
            version: "15.2.42".to_string(),
            namespace: Some("apps".to_string()),
            helm_app: Some(helm_app()),
            ..Application::default()
        }
    }

    fn deployment(apps: Vec<Application>) -> Deployment {
        let spec = DeploymentSpec {
            display_name: "wordpress".to_string(),
            project: "acme".to_string(),
            deployment_package_ref: DeploymentPackageRef {
                name: "wordpress".to_string(),
                version: "0.1.0".to_string(),
                ..DeploymentPackageRef::default()
            },
            applications: apps,
            deployment_type: DeploymentType::AutoScaling,
            child_deployment_list: None,
            network_ref: None,
        };
        let mut d = Deployment::new("216e7223-1932-4df6-a6c7-828c84479726", spec);
        d.metadata.namespace = Some("project-ns".to_string());
        d.metadata.generation = Some(2);
        d.metadata.labels = Some(
            [(
                crate::labels::LABEL_ACTIVE_PROJECT_ID.to_string(),
                "proj-uid".to_string(),
            )]
            .into(),
        );
        d
    }

    async fn read_fleet_config(path: &std::path::Path) -> FleetConfig {
        let raw = tokio::fs::read_to_string(path).await.unwrap();
        serde_yaml::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_generate_emits_per_app_trees() {
        let dir = TempDir::new().unwrap();
        let d = deployment(vec![application("wordpress"), application("nginx")]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("catalog-apps-acme-proj".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        for app in ["wordpress", "nginx"] {
            let app_dir = dir.path().join(app);
            for file in [
                "fleet.yaml",
                "profile.yaml",
                "overrides.yaml",
                "fleet-globals.yaml",
            ] {
                assert!(app_dir.join(file).is_file(), "{app}/{file} missing");
            }
            for file in [
                "kustomization.yaml",
                "network-policy-ingress.yaml",
                "network-policy-egress.yaml",
            ] {
                assert!(
                    app_dir.join("kustomize").join(file).is_file(),
                    "{app}/kustomize/{file} missing"
                );
            }
        }

        let fleet = read_fleet_config(&dir.path().join("wordpress/fleet.yaml")).await;
        let expected = bundle_name(&d.spec.applications[0], "216e7223-1932-4df6-a6c7-828c84479726");
        assert_eq!(fleet.name, expected);
        assert_eq!(fleet.default_namespace, "apps");
        assert_eq!(
            fleet.labels.get(crate::labels::LABEL_APP_NAME),
            Some(&"wordpress".to_string())
        );
        assert_eq!(
            fleet.labels.get(crate::labels::LABEL_BUNDLE_TYPE),
            Some(&"app".to_string())
        );
        assert_eq!(
            fleet.labels.get(crate::labels::LABEL_DEPLOYMENT_GENERATION),
            Some(&"2".to_string())
        );
        let helm = fleet.helm.unwrap();
        assert_eq!(helm.release_name, expected);
        assert_eq!(
            helm.values_files,
            vec!["profile.yaml", "overrides.yaml", "fleet-globals.yaml"]
        );
    }

    #[tokio::test]
    async fn test_generate_is_deterministic_without_namespaces() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let d = deployment(vec![application("wordpress")]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("p".to_string());
        let config = Config::for_tests();

        generate_fleet_configs(&d, dir_a.path(), &secrets, &projects, &config)
            .await
            .unwrap();
        generate_fleet_configs(&d, dir_b.path(), &secrets, &projects, &config)
            .await
            .unwrap();

        let a = tokio::fs::read(dir_a.path().join("wordpress/fleet.yaml"))
            .await
            .unwrap();
        let b = tokio::fs::read(dir_b.path().join("wordpress/fleet.yaml"))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_depends_on_wiring_between_siblings() {
        let dir = TempDir::new().unwrap();
        let mut nginx = application("nginx");
        nginx.depends_on = Some(vec!["wordpress".to_string()]);
        let d = deployment(vec![application("wordpress"), nginx]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("p".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        let fleet = read_fleet_config(&dir.path().join("nginx/fleet.yaml")).await;
        let expected = bundle_name(&d.spec.applications[0], "216e7223-1932-4df6-a6c7-828c84479726");
        assert_eq!(fleet.depends_on.len(), 1);
        assert_eq!(fleet.depends_on[0].name, expected);
    }

    #[tokio::test]
    async fn test_depends_on_unknown_sibling_fails() {
        let dir = TempDir::new().unwrap();
        let mut app = application("nginx");
        app.depends_on = Some(vec!["missing".to_string()]);
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("p".to_string());

        let result =
            generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests()).await;
        assert!(matches!(result, Err(GeneratorError::Config(_))));
    }

    #[tokio::test]
    async fn test_package_namespaces_produce_bootstrap_bundles() {
        let dir = TempDir::new().unwrap();
        let mut d = deployment(vec![application("wordpress")]);
        d.spec.deployment_package_ref.namespaces = Some(vec![crate::crd::PackageNamespace {
            name: "shared".to_string(),
            labels: Some([("team".to_string(), "edge".to_string())].into()),
            annotations: None,
        }]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("p".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        let ns_dir = dir.path().join("wordpress/shared-ns");
        assert!(ns_dir.join("fleet.yaml").is_file());
        assert!(ns_dir.join("empty.yaml").is_file());

        let ns_fleet = read_fleet_config(&ns_dir.join("fleet.yaml")).await;
        assert_eq!(ns_fleet.default_namespace, "shared");
        assert_eq!(
            ns_fleet.namespace_labels.get("team"),
            Some(&"edge".to_string())
        );
        assert!(ns_fleet.name.starts_with("shared-"));

        let app_fleet = read_fleet_config(&dir.path().join("wordpress/fleet.yaml")).await;
        assert_eq!(app_fleet.depends_on.len(), 1);
        assert_eq!(app_fleet.depends_on[0].name, ns_fleet.name);
    }

    #[tokio::test]
    async fn test_ignore_resources_emit_compare_patch() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        app.ignore_resources = Some(vec![IgnoreResource {
            name: "vw1".to_string(),
            kind: "ValidatingWebhookConfiguration".to_string(),
            api_version: None,
            namespace: None,
        }]);
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("p".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        let fleet = read_fleet_config(&dir.path().join("wordpress/fleet.yaml")).await;
        let diff = fleet.diff.unwrap();
        assert_eq!(diff.compare_patches.len(), 1);
        let patch = &diff.compare_patches[0];
        assert_eq!(patch.kind, "ValidatingWebhookConfiguration");
        assert_eq!(patch.api_version, "admissionregistration.k8s.io/v1");
        assert_eq!(patch.name, "vw1");
        assert_eq!(patch.operations[0].path, "/webhooks");
    }

    #[tokio::test]
    async fn test_ignore_resources_namespace_on_cluster_scoped_fails() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        app.ignore_resources = Some(vec![IgnoreResource {
            name: "vw1".to_string(),
            kind: "ValidatingWebhookConfiguration".to_string(),
            api_version: None,
            namespace: Some("ns-1".to_string()),
        }]);
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("p".to_string());

        let result =
            generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests()).await;
        assert!(matches!(result, Err(GeneratorError::Config(_))));
    }

    #[tokio::test]
    async fn test_docker_credential_substitution_in_profile() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        app.profile_secret_name = Some("profile-secret".to_string());
        if let Some(helm) = app.helm_app.as_mut() {
            helm.image_registry = Some("registry.example.org".to_string());
            helm.image_registry_secret_name = Some("reg-secret".to_string());
        }
        let bundle = bundle_name(&app, "216e7223-1932-4df6-a6c7-828c84479726");
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new()
            .with_values("profile-secret", "pullSecret: %GeneratedDockerCredential%\n")
            .with_credentials("reg-secret", "user", "pass");
        let projects = StaticProjectLookup("p".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        let profile = tokio::fs::read_to_string(dir.path().join("wordpress/profile.yaml"))
            .await
            .unwrap();
        assert_eq!(profile, format!("pullSecret: {bundle}\n"));

        // without a pre-hook the credential rides in the kustomization
        let kustomization =
            tokio::fs::read_to_string(dir.path().join("wordpress/kustomize/kustomization.yaml"))
                .await
                .unwrap();
        assert!(kustomization.contains("secretGenerator"));
        assert!(kustomization.contains(&bundle));
        assert!(kustomization.contains("disableNameSuffixHash: true"));
    }

    #[tokio::test]
    async fn test_docker_credential_token_without_registry_secret_fails() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        app.profile_secret_name = Some("profile-secret".to_string());
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new()
            .with_values("profile-secret", "pullSecret: %GeneratedDockerCredential%\n");
        let projects = StaticProjectLookup("p".to_string());

        let result =
            generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests()).await;
        assert!(matches!(result, Err(GeneratorError::Config(_))));
    }

    #[tokio::test]
    async fn test_pre_hook_emits_secret_bundle() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        app.profile_secret_name = Some("profile-secret".to_string());
        if let Some(helm) = app.helm_app.as_mut() {
            helm.image_registry = Some("registry.example.org".to_string());
            helm.image_registry_secret_name = Some("reg-secret".to_string());
        }
        let bundle = bundle_name(&app, "216e7223-1932-4df6-a6c7-828c84479726");
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new()
            .with_values("profile-secret", "hook: %PreHookCredential%\n")
            .with_credentials("reg-secret", "user", "pass");
        let projects = StaticProjectLookup("p".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        let secret_dir = dir.path().join("wordpress/secret-dir");
        assert!(secret_dir.join("fleet.yaml").is_file());
        assert!(secret_dir.join("image-reg-secret.yaml").is_file());

        let secret_fleet = read_fleet_config(&secret_dir.join("fleet.yaml")).await;
        assert_eq!(secret_fleet.name, format!("pre-install-secret-{bundle}"));

        let app_fleet = read_fleet_config(&dir.path().join("wordpress/fleet.yaml")).await;
        assert!(app_fleet
            .depends_on
            .iter()
            .any(|d| d.name == format!("pre-install-secret-{bundle}")));

        // the token itself stays in the profile
        let profile = tokio::fs::read_to_string(dir.path().join("wordpress/profile.yaml"))
            .await
            .unwrap();
        assert!(profile.contains("%PreHookCredential%"));
    }

    #[tokio::test]
    async fn test_registry_project_name_substitution() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        app.profile_secret_name = Some("profile-secret".to_string());
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new()
            .with_values("profile-secret", "project: %RegistryProjectName%\n");
        let projects = StaticProjectLookup("catalog-apps-acme-demo".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        let profile = tokio::fs::read_to_string(dir.path().join("wordpress/profile.yaml"))
            .await
            .unwrap();
        assert_eq!(profile, "project: catalog-apps-acme-demo\n");
    }

    #[tokio::test]
    async fn test_registry_project_token_without_project_label_fails() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        app.profile_secret_name = Some("profile-secret".to_string());
        let mut d = deployment(vec![app]);
        d.metadata.labels = None;
        let secrets = MapSecretReader::new()
            .with_values("profile-secret", "project: %RegistryProjectName%\n");
        let projects = StaticProjectLookup("p".to_string());

        let result =
            generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests()).await;
        assert!(matches!(result, Err(GeneratorError::Config(_))));
    }

    #[tokio::test]
    async fn test_oci_repo_folded_into_chart() {
        let dir = TempDir::new().unwrap();
        let mut app = application("wordpress");
        if let Some(helm) = app.helm_app.as_mut() {
            helm.repo = "oci://registry.example.org/charts".to_string();
        }
        let d = deployment(vec![app]);
        let secrets = MapSecretReader::new();
        let projects = StaticProjectLookup("p".to_string());

        generate_fleet_configs(&d, dir.path(), &secrets, &projects, &Config::for_tests())
            .await
            .unwrap();

        let fleet = read_fleet_config(&dir.path().join("wordpress/fleet.yaml")).await;
        let helm = fleet.helm.unwrap();
        assert_eq!(helm.repo, "");
        assert_eq!(helm.chart, "oci://registry.example.org/charts/wordpress");
    }
}
