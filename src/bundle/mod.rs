// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Bundle config generation.
//!
//! Pure generation: given a `Deployment`, a working directory, a secret
//! reader and a project lookup, materialize the per-application GitOps tree
//! the CD engine consumes:
//!
//! ```text
//! <basedir>/<app>/fleet.yaml
//!               profile.yaml
//!               overrides.yaml
//!               fleet-globals.yaml
//!               kustomize/kustomization.yaml
//!               kustomize/network-policy-ingress.yaml
//!               kustomize/network-policy-egress.yaml
//!               [<ns>-ns/fleet.yaml, <ns>-ns/empty.yaml]       per package namespace
//!               [secret-dir/fleet.yaml, image-reg-secret.yaml] when pre-hooked
//! ```
//!
//! Nothing here touches git or patches API objects; the deployment
//! reconciler owns those steps.

use async_trait::async_trait;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::crd::{Application, Deployment, PackageNamespace};
use crate::labels::{
    BUNDLE_TYPE_APP, LABEL_ACTIVE_PROJECT_ID, LABEL_APP_NAME, LABEL_BUNDLE_TYPE,
    LABEL_CLUSTER_NAME, LABEL_CLUSTER_ORCH_PROJECT_ID, LABEL_DEPLOYMENT_GENERATION,
    LABEL_DEPLOYMENT_ID, LABEL_HOST_UUID,
};

pub mod fleet_yaml;
pub mod ignore_resources;
pub mod placeholders;

use fleet_yaml::{
    allow_all_policy, bundle_name, helm_addresses, DependsOnItem, DiffOptions, ExtraValues,
    FleetConfig, FleetGlobals, GeneratorOptions, GlobalValues, HelmBlock, Kustomization,
    KustomizeBlock, ManifestMeta, PolicyDirection, SecretArgs, SecretManifest,
};

/// Generator failure taxonomy. `Config` errors need user intervention; the
/// rest are retriable.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The deployment spec or its secrets are unusable as-is
    #[error("{0}")]
    Config(String),

    /// A secret read failed
    #[error("failed to read secret: {0}")]
    Secret(String),

    /// The project lookup failed
    #[error("project lookup failed: {0}")]
    Project(String),

    #[error("failed to write fleet config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to render fleet config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Source of secret contents referenced by a deployment.
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// The `values` entry of a secret, or empty when `name` is empty.
    async fn values(&self, namespace: &str, name: &str) -> Result<String, GeneratorError>;

    /// The `(username, password)` entries of a registry credential secret.
    async fn registry_credentials(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(String, String), GeneratorError>;
}

/// [`SecretReader`] over the Kubernetes API.
pub struct KubeSecretReader {
    client: Client,
}

impl KubeSecretReader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        KubeSecretReader { client }
    }

    async fn secret(&self, namespace: &str, name: &str) -> Result<Secret, GeneratorError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| GeneratorError::Secret(format!("{namespace}/{name}: {e}")))
    }
}

fn secret_entry(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
}

#[async_trait]
impl SecretReader for KubeSecretReader {
    async fn values(&self, namespace: &str, name: &str) -> Result<String, GeneratorError> {
        if name.is_empty() {
            return Ok(String::new());
        }
        let secret = self.secret(namespace, name).await?;
        Ok(secret_entry(&secret, "values").unwrap_or_default())
    }

    async fn registry_credentials(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(String, String), GeneratorError> {
        let secret = self.secret(namespace, name).await?;
        let username = secret_entry(&secret, "username").unwrap_or_default();
        let password = secret_entry(&secret, "password").unwrap_or_default();
        Ok((username, password))
    }
}

/// Resolves the harbor registry project name for a project id.
#[async_trait]
pub trait ProjectLookup: Send + Sync {
    async fn registry_project_name(&self, project_id: &str) -> Result<String, GeneratorError>;
}

/// Prefix of harbor registry projects provisioned per tenancy project.
const REGISTRY_PROJECT_PREFIX: &str = "catalog-apps";

/// Label carrying the owning organization on tenancy runtime projects.
const RUNTIME_ORG_LABEL: &str = "runtimeorgs.runtimeorg.edge-orchestrator.intel.com";

/// [`ProjectLookup`] over the tenancy runtime-project records.
pub struct RuntimeProjectLookup {
    client: Client,
}

impl RuntimeProjectLookup {
    #[must_use]
    pub fn new(client: Client) -> Self {
        RuntimeProjectLookup { client }
    }
}

#[async_trait]
impl ProjectLookup for RuntimeProjectLookup {
    async fn registry_project_name(&self, project_id: &str) -> Result<String, GeneratorError> {
        let gvk = GroupVersionKind::gvk(
            "runtimeproject.edge-orchestrator.intel.com",
            "v1",
            "RuntimeProject",
        );
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let projects = api
            .list(&ListParams::default())
            .await
            .map_err(|e| GeneratorError::Project(e.to_string()))?;

        for project in projects {
            if project.metadata.uid.as_deref() != Some(project_id) {
                continue;
            }
            let display_name = project
                .data
                .pointer("/spec/displayName")
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
                .or_else(|| project.metadata.name.clone())
                .unwrap_or_default();
            let org = project
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(RUNTIME_ORG_LABEL))
                .cloned()
                .ok_or_else(|| {
                    GeneratorError::Project(format!(
                        "runtime project {display_name} has no label {RUNTIME_ORG_LABEL}"
                    ))
                })?;
            return Ok(format!("{REGISTRY_PROJECT_PREFIX}-{org}-{display_name}"));
        }

        Err(GeneratorError::Project(format!(
            "no runtime project with uid {project_id}"
        )))
    }
}

async fn write_yaml<T: Serialize + Sync>(
    dir: &Path,
    file: &str,
    value: &T,
) -> Result<(), GeneratorError> {
    let rendered = serde_yaml::to_string(value)?;
    write_raw(dir, file, &rendered).await
}

async fn write_raw(dir: &Path, file: &str, contents: &str) -> Result<(), GeneratorError> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(file), contents.as_bytes()).await?;
    Ok(())
}

/// Random lowercase suffix disambiguating namespace-bootstrap bundles across
/// generations.
fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..5].to_string()
}

/// Lazily-resolved registry project name, fetched at most once.
struct ProjectNameCache<'a> {
    lookup: &'a dyn ProjectLookup,
    project_id: Option<String>,
    resolved: Option<String>,
}

impl<'a> ProjectNameCache<'a> {
    fn new(lookup: &'a dyn ProjectLookup, deployment: &Deployment) -> Self {
        let project_id = deployment
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LABEL_ACTIVE_PROJECT_ID))
            .cloned();
        ProjectNameCache {
            lookup,
            project_id,
            resolved: None,
        }
    }

    async fn get(&mut self) -> Result<String, GeneratorError> {
        if let Some(name) = &self.resolved {
            return Ok(name.clone());
        }
        let project_id = self.project_id.as_deref().ok_or_else(|| {
            GeneratorError::Config("project-id not found in deployment labels".to_string())
        })?;
        let name = self.lookup.registry_project_name(project_id).await?;
        self.resolved = Some(name.clone());
        Ok(name)
    }
}

/// Generate the full per-application GitOps tree for one deployment.
///
/// # Errors
///
/// Returns [`GeneratorError::Config`] for spec problems the user must fix,
/// and IO/secret/lookup errors for retriable failures.
pub async fn generate_fleet_configs(
    deployment: &Deployment,
    base_dir: &Path,
    secrets: &dyn SecretReader,
    projects: &dyn ProjectLookup,
    config: &Config,
) -> Result<(), GeneratorError> {
    let deployment_name = deployment.metadata.name.clone().unwrap_or_default();
    let deployment_namespace = deployment.metadata.namespace.clone().unwrap_or_default();
    let deployment_id = deployment.deployment_id();
    let generation = deployment.metadata.generation.unwrap_or(0);

    let app_map: BTreeMap<&str, &Application> = deployment
        .spec
        .applications
        .iter()
        .map(|app| (app.name.as_str(), app))
        .collect();

    let package_namespaces: &[PackageNamespace] = deployment
        .spec
        .deployment_package_ref
        .namespaces
        .as_deref()
        .unwrap_or_default();

    // One suffix per generation pass so repeated reconciles of the same
    // working tree produce fresh namespace bundle identities
    let ns_suffix = if package_namespaces.is_empty() {
        String::new()
    } else {
        random_suffix()
    };

    let mut project_name = ProjectNameCache::new(projects, deployment);

    for app in &deployment.spec.applications {
        let app_dir = base_dir.join(&app.name);
        let namespace = app.namespace.clone().unwrap_or_default();
        let helm = app.helm_app.clone().unwrap_or_default();
        let name = bundle_name(app, &deployment_name);

        let has_image_credentials = helm
            .image_registry_secret_name
            .as_deref()
            .is_some_and(|s| !s.is_empty());

        let mut fleet = app_fleet_config(
            app,
            &app_map,
            &deployment_id,
            &deployment_name,
            generation,
            &namespace,
        )?;

        // profile.yaml from the catalog profile secret
        let profile_secret = app.profile_secret_name.as_deref().unwrap_or_default();
        let mut profile = secrets.values(&deployment_namespace, profile_secret).await?;
        profile = placeholders::substitute_docker_credential(
            &profile,
            &name,
            has_image_credentials,
            true,
        )?;
        let has_pre_hook = placeholders::has_pre_hook(&profile);
        profile = placeholders::substitute_image_registry(
            &profile,
            &app.name,
            helm.image_registry.as_deref(),
        )?;
        if profile.contains(placeholders::REGISTRY_PROJECT_NAME) {
            let resolved = project_name.get().await?;
            debug!(app = %app.name, project = %resolved, "Resolved registry project name");
            profile = profile.replace(placeholders::REGISTRY_PROJECT_NAME, &resolved);
        }
        write_raw(&app_dir, "profile.yaml", &profile).await?;

        // overrides.yaml from the user value secret; leftover credential
        // tokens here are tolerated
        let value_secret = app.value_secret_name.as_deref().unwrap_or_default();
        let mut overrides = secrets.values(&deployment_namespace, value_secret).await?;
        overrides = placeholders::substitute_docker_credential(
            &overrides,
            &name,
            has_image_credentials,
            false,
        )?;
        write_raw(&app_dir, "overrides.yaml", &overrides).await?;

        write_yaml(
            &app_dir,
            "fleet-globals.yaml",
            &fleet_globals(generation, config),
        )
        .await?;

        if let Some(helm_block) = fleet.helm.as_mut() {
            helm_block.values_files = vec![
                "profile.yaml".to_string(),
                "overrides.yaml".to_string(),
                "fleet-globals.yaml".to_string(),
            ];
        }

        // kustomize payload: allow-all network policies plus, without a
        // pre-hook, the generated image pull secret
        let kustomize_dir = app_dir.join("kustomize");
        let policy_stem = format!(
            "{}-{}-{}",
            app.name,
            app.version,
            deployment_name.replace("deployment-", "")
        );
        write_yaml(
            &kustomize_dir,
            "network-policy-ingress.yaml",
            &allow_all_policy(&format!("{policy_stem}-ingress"), PolicyDirection::Ingress),
        )
        .await?;
        write_yaml(
            &kustomize_dir,
            "network-policy-egress.yaml",
            &allow_all_policy(&format!("{policy_stem}-egress"), PolicyDirection::Egress),
        )
        .await?;

        let mut kustomization = Kustomization {
            resources: vec![
                "network-policy-ingress.yaml".to_string(),
                "network-policy-egress.yaml".to_string(),
            ],
            ..Kustomization::default()
        };

        for package_ns in package_namespaces {
            let ns_bundle = format!("{}-{ns_suffix}", package_ns.name);
            write_namespace_bundle(&app_dir, package_ns, &ns_bundle).await?;
            fleet.depends_on.push(DependsOnItem { name: ns_bundle });
        }

        if has_pre_hook {
            write_pre_hook_secret_bundle(
                &app_dir,
                &helm,
                &deployment_namespace,
                &namespace,
                &name,
                secrets,
            )
            .await?;
            fleet.depends_on.push(DependsOnItem {
                name: format!("pre-install-secret-{name}"),
            });
        } else if has_image_credentials {
            inject_image_credential_generator(
                &mut kustomization,
                &helm,
                &deployment_namespace,
                &namespace,
                &name,
                secrets,
            )
            .await?;
        }

        write_yaml(&kustomize_dir, "kustomization.yaml", &kustomization).await?;
        fleet.kustomize = Some(KustomizeBlock {
            dir: "./kustomize".to_string(),
        });

        write_yaml(&app_dir, "fleet.yaml", &fleet).await?;
    }

    Ok(())
}

/// Base `fleet.yaml` for one application: identity labels, helm addressing,
/// sibling depends-on wiring and diff exclusions.
fn app_fleet_config(
    app: &Application,
    app_map: &BTreeMap<&str, &Application>,
    deployment_id: &str,
    deployment_name: &str,
    generation: i64,
    namespace: &str,
) -> Result<FleetConfig, GeneratorError> {
    let name = bundle_name(app, deployment_name);
    let helm = app.helm_app.clone().unwrap_or_default();
    let (repo, chart) = helm_addresses(&helm.repo, &helm.chart);

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP_NAME.to_string(), app.name.clone());
    labels.insert(LABEL_BUNDLE_TYPE.to_string(), BUNDLE_TYPE_APP.to_string());
    labels.insert(LABEL_DEPLOYMENT_ID.to_string(), deployment_id.to_string());
    labels.insert(
        LABEL_DEPLOYMENT_GENERATION.to_string(),
        generation.to_string(),
    );

    let mut depends_on = Vec::new();
    for dep_name in app.depends_on.as_deref().unwrap_or_default() {
        // dependencies must be siblings within the same deployment package
        let dep = app_map.get(dep_name.as_str()).ok_or_else(|| {
            GeneratorError::Config(format!(
                "app {} depends on unknown sibling {dep_name}",
                app.name
            ))
        })?;
        depends_on.push(DependsOnItem {
            name: bundle_name(dep, deployment_name),
        });
    }

    let mut compare_patches = Vec::new();
    for resource in app.ignore_resources.as_deref().unwrap_or_default() {
        compare_patches.push(ignore_resources::compare_patch(resource, namespace)?);
    }

    Ok(FleetConfig {
        name: name.clone(),
        labels,
        default_namespace: namespace.to_string(),
        helm: Some(HelmBlock {
            release_name: name,
            repo,
            chart,
            version: helm.version,
            values_files: Vec::new(),
        }),
        kustomize: None,
        depends_on,
        diff: if compare_patches.is_empty() {
            None
        } else {
            Some(DiffOptions { compare_patches })
        },
        namespace_labels: app.namespace_labels.clone().unwrap_or_default(),
        namespace_annotations: BTreeMap::new(),
    })
}

fn fleet_globals(generation: i64, config: &Config) -> ExtraValues {
    let cluster_labels = if config.fleet_add_global_vars {
        let mut map = BTreeMap::new();
        map.insert(
            LABEL_CLUSTER_NAME.to_string(),
            format!("global.fleet.clusterLabels.{LABEL_CLUSTER_NAME}"),
        );
        map.insert(
            LABEL_CLUSTER_ORCH_PROJECT_ID.to_string(),
            format!("global.fleet.clusterLabels.{LABEL_CLUSTER_ORCH_PROJECT_ID}"),
        );
        map.insert(
            LABEL_HOST_UUID.to_string(),
            format!("global.fleet.{LABEL_HOST_UUID}"),
        );
        Some(map)
    } else {
        None
    };

    ExtraValues {
        global: GlobalValues {
            fleet: FleetGlobals {
                deployment_generation: generation,
                cluster_labels,
            },
        },
    }
}

/// Namespace-bootstrap bundle: a fleet.yaml creating the namespace with its
/// labels and annotations, plus an empty manifest to force bundle creation.
async fn write_namespace_bundle(
    app_dir: &Path,
    namespace: &PackageNamespace,
    bundle: &str,
) -> Result<(), GeneratorError> {
    let ns_dir: PathBuf = app_dir.join(format!("{}-ns", namespace.name));
    let fleet = FleetConfig {
        name: bundle.to_string(),
        default_namespace: namespace.name.clone(),
        namespace_labels: namespace.labels.clone().unwrap_or_default(),
        namespace_annotations: namespace.annotations.clone().unwrap_or_default(),
        ..FleetConfig::default()
    };
    write_yaml(&ns_dir, "fleet.yaml", &fleet).await?;
    write_raw(&ns_dir, "empty.yaml", "{}\n").await
}

fn docker_config_json(registry: &str, username: &str, password: &str) -> String {
    serde_json::json!({
        "auths": {
            registry: {
                "username": username,
                "password": password,
            }
        }
    })
    .to_string()
}

/// Pre-hook layout: the image pull secret lands in its own bundle so hooks
/// running before the chart can already pull images.
async fn write_pre_hook_secret_bundle(
    app_dir: &Path,
    helm: &crate::crd::HelmApp,
    secret_namespace: &str,
    app_namespace: &str,
    bundle: &str,
    secrets: &dyn SecretReader,
) -> Result<(), GeneratorError> {
    let registry_secret = helm.image_registry_secret_name.as_deref().unwrap_or_default();
    let registry = helm.image_registry.as_deref().unwrap_or_default();
    let (username, password) = secrets
        .registry_credentials(secret_namespace, registry_secret)
        .await?;
    let credentials = docker_config_json(registry, &username, &password);

    let secret_dir = app_dir.join("secret-dir");
    let fleet = FleetConfig {
        name: format!("pre-install-secret-{bundle}"),
        default_namespace: app_namespace.to_string(),
        ..FleetConfig::default()
    };
    write_yaml(&secret_dir, "fleet.yaml", &fleet).await?;

    let b64 = base64::engine::general_purpose::STANDARD;
    let mut data = BTreeMap::new();
    data.insert(".dockerconfigjson".to_string(), b64.encode(&credentials));
    data.insert("accessKeyId".to_string(), b64.encode(&username));
    data.insert("secretKey".to_string(), b64.encode(&password));

    let manifest = SecretManifest {
        api_version: "v1".to_string(),
        kind: "Secret".to_string(),
        r#type: "kubernetes.io/dockerconfigjson".to_string(),
        metadata: ManifestMeta {
            name: bundle.to_string(),
            namespace: Some(app_namespace.to_string()),
        },
        data,
    };
    write_yaml(&secret_dir, "image-reg-secret.yaml", &manifest).await
}

/// Without a pre-hook the image pull secret rides inside the app bundle via
/// a kustomize secretGenerator.
async fn inject_image_credential_generator(
    kustomization: &mut Kustomization,
    helm: &crate::crd::HelmApp,
    secret_namespace: &str,
    app_namespace: &str,
    bundle: &str,
    secrets: &dyn SecretReader,
) -> Result<(), GeneratorError> {
    let registry_secret = helm.image_registry_secret_name.as_deref().unwrap_or_default();
    let registry = helm.image_registry.as_deref().unwrap_or_default();
    let (username, password) = secrets
        .registry_credentials(secret_namespace, registry_secret)
        .await?;
    let credentials = docker_config_json(registry, &username, &password);

    kustomization.secret_generator = Some(vec![SecretArgs {
        name: bundle.to_string(),
        namespace: app_namespace.to_string(),
        literals: vec![
            format!(".dockerconfigjson={credentials}"),
            format!("accessKeyId={username}"),
            format!("secretKey={password}"),
        ],
        r#type: "kubernetes.io/dockerconfigjson".to_string(),
    }]);
    kustomization.generator_options = Some(GeneratorOptions {
        disable_name_suffix_hash: true,
    });
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
