// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! `GitRepo` binding phase.
//!
//! One binding exists per application, named `<app>-<deployment-id>` and
//! owned by the deployment. The phase converges the bindings against the
//! spec: update drifted ones, create missing ones, delete orphans left by
//! removed applications. The outcome lands in the `GitReposUpdated`
//! condition.

use anyhow::{anyhow, Context as _, Result};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use crate::bundle::fleet_yaml::bundle_name;
use crate::config::Config;
use crate::constants::{
    CONDITION_GIT_REPOS_UPDATED, FLEET_GIT_SECRET_NAME, REASON_GIT_REPO_UPDATE_FAILED,
    REASON_SUCCESS,
};
use crate::context::Context;
use crate::crd::{Application, Deployment, DeploymentStatus};
use crate::fleet::{ClusterSelector, GitRepo, GitRepoSpec, GitTarget};
use crate::labels::{
    BUNDLE_TYPE_APP, LABEL_ACTIVE_PROJECT_ID, LABEL_BUNDLE_NAME, LABEL_BUNDLE_TYPE,
};
use crate::patch::PatchHelper;
use crate::reconcilers::deployment::repository::build_git_client;
use crate::reconcilers::status::update_status_condition;

/// Binding name for one application of one deployment.
#[must_use]
pub fn git_repo_name(app_name: &str, deployment_id: &str) -> String {
    format!("{app_name}-{deployment_id}")
}

/// Recover the application name from a binding name.
#[must_use]
pub fn app_name_for_git_repo(repo_name: &str, deployment_id: &str) -> String {
    repo_name
        .strip_suffix(&format!("-{deployment_id}"))
        .unwrap_or(repo_name)
        .to_string()
}

/// The `GitRepo` bindings controlled by this deployment.
pub async fn owned_git_repos(ctx: &Context, d: &Deployment) -> Result<Vec<GitRepo>> {
    let namespace = d.namespace().context("deployment has no namespace")?;
    let api: Api<GitRepo> = Api::namespaced(ctx.client.clone(), &namespace);
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .into_iter()
        .filter(|repo| is_controlled_by(repo, d))
        .collect())
}

fn is_controlled_by(repo: &GitRepo, d: &Deployment) -> bool {
    let Some(uid) = d.metadata.uid.as_deref() else {
        return false;
    };
    repo.metadata.owner_references.as_ref().is_some_and(|refs| {
        refs.iter()
            .any(|r| r.controller == Some(true) && r.uid == uid)
    })
}

/// Whether any owned binding points at a different repository URL than the
/// one the current credentials resolve to. Detects git server or user
/// migrations that require a full re-reconcile.
pub async fn git_url_has_changed(ctx: &Context, d: &Deployment) -> Result<bool> {
    let client = build_git_client(ctx, &d.deployment_id()).await?;
    let url = client.remote_url();
    let repos = owned_git_repos(ctx, d).await?;
    Ok(repos.iter().any(|repo| repo.spec.repo != url))
}

/// Converge the bindings and record the outcome in the `GitReposUpdated`
/// condition.
pub async fn reconcile_git_repos(ctx: &Context, d: &mut Deployment) -> Result<()> {
    let outcome = sync_git_repos(ctx, d).await;
    let status = d.status.get_or_insert_with(DeploymentStatus::default);
    match outcome {
        Ok(()) => {
            update_status_condition(
                &mut status.conditions,
                CONDITION_GIT_REPOS_UPDATED,
                "True",
                REASON_SUCCESS,
                None,
            );
            Ok(())
        }
        Err(e) => {
            update_status_condition(
                &mut status.conditions,
                CONDITION_GIT_REPOS_UPDATED,
                "False",
                REASON_GIT_REPO_UPDATE_FAILED,
                Some(format!("{e:#}")),
            );
            Err(e)
        }
    }
}

async fn sync_git_repos(ctx: &Context, d: &Deployment) -> Result<()> {
    let deployment_id = d.deployment_id();
    let namespace = d.namespace().context("deployment has no namespace")?;
    let project_id = d
        .labels()
        .get(LABEL_ACTIVE_PROJECT_ID)
        .cloned()
        .ok_or_else(|| {
            anyhow!("deployment {deployment_id} has no {LABEL_ACTIVE_PROJECT_ID} label")
        })?;

    let client = build_git_client(ctx, &deployment_id).await?;
    let url = client.remote_url().to_string();

    let api: Api<GitRepo> = Api::namespaced(ctx.client.clone(), &namespace);
    let existing: HashMap<String, GitRepo> = owned_git_repos(ctx, d)
        .await?
        .into_iter()
        .map(|repo| (repo.name_any(), repo))
        .collect();

    let mut desired: HashSet<String> = HashSet::new();
    for app in &d.spec.applications {
        let name = git_repo_name(&app.name, &deployment_id);
        desired.insert(name.clone());
        let bundle = bundle_name(app, &deployment_id);

        match existing.get(&name) {
            Some(current) => {
                let mut updated = current.clone();
                let helper = PatchHelper::new(&updated)?;
                updated.spec = desired_spec(&ctx.config, app, &url, Some(&current.spec));
                updated
                    .metadata
                    .labels
                    .get_or_insert_with(BTreeMap::new)
                    .insert(LABEL_BUNDLE_NAME.to_string(), bundle);
                if !helper.changed_keys(&updated).is_empty() {
                    debug!(binding = %name, "Updating GitRepo binding");
                    helper
                        .patch(&api, &updated, crate::patch::PatchOptions::default())
                        .await?;
                }
            }
            None => {
                info!(binding = %name, "Creating GitRepo binding");
                let repo = new_git_repo(
                    &ctx.config,
                    d,
                    app,
                    &name,
                    &namespace,
                    &url,
                    &bundle,
                    &project_id,
                );
                api.create(&PostParams::default(), &repo).await?;
            }
        }
    }

    for (name, _) in existing {
        if !desired.contains(&name) {
            info!(binding = %name, "Deleting orphaned GitRepo binding");
            api.delete(&name, &DeleteParams::default()).await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn new_git_repo(
    config: &Config,
    d: &Deployment,
    app: &Application,
    name: &str,
    namespace: &str,
    url: &str,
    bundle: &str,
    project_id: &str,
) -> GitRepo {
    let mut repo = GitRepo::new(name, desired_spec(config, app, url, None));
    repo.metadata.namespace = Some(namespace.to_string());
    repo.metadata.labels = Some(BTreeMap::from([
        (LABEL_BUNDLE_NAME.to_string(), bundle.to_string()),
        (LABEL_BUNDLE_TYPE.to_string(), BUNDLE_TYPE_APP.to_string()),
        (LABEL_ACTIVE_PROJECT_ID.to_string(), project_id.to_string()),
    ]));
    if let Some(owner) = d.controller_owner_ref(&()) {
        repo.metadata.owner_references = Some(vec![owner]);
    }
    repo
}

/// The binding spec an application should have. `previous` preserves the
/// fields this phase does not own (branch, force-sync counter).
fn desired_spec(
    config: &Config,
    app: &Application,
    url: &str,
    previous: Option<&GitRepoSpec>,
) -> GitRepoSpec {
    GitRepoSpec {
        repo: url.to_string(),
        branch: previous.and_then(|p| p.branch.clone()),
        paths: vec![app.name.clone()],
        targets: git_targets(app),
        polling_interval: Some(config.fleet_git_polling_interval.clone()),
        client_secret_name: Some(FLEET_GIT_SECRET_NAME.to_string()),
        helm_secret_name: app
            .helm_app
            .as_ref()
            .and_then(|h| h.repo_secret_name.clone())
            .or_else(|| config.api_agent_helm_secret_name.clone()),
        ca_bundle: config.git_ca_cert.clone(),
        force_sync_generation: previous.and_then(|p| p.force_sync_generation),
    }
}

/// Targeting rules from the app's label selectors. Rule names are indexed so
/// repeated reconciles produce identical specs.
fn git_targets(app: &Application) -> Vec<GitTarget> {
    app.targets
        .as_ref()
        .map(|targets| {
            targets
                .iter()
                .enumerate()
                .map(|(i, labels)| GitTarget {
                    name: Some(format!("match-{i}")),
                    cluster_selector: Some(ClusterSelector {
                        match_labels: Some(labels.clone()),
                    }),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "gitrepo_tests.rs"]
mod gitrepo_tests;
