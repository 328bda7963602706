// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Git repository phase.
//!
//! Rebuilds the per-deployment repository from scratch on every non-converged
//! pass: wipe the scratch directory, clone or initialize, regenerate the
//! fleet configs, commit, push. The outcome lands in the `GitSynced`
//! condition with a reason naming the step that failed.

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::bundle::{generate_fleet_configs, KubeSecretReader, RuntimeProjectLookup};
use crate::constants::{
    CONDITION_GIT_SYNCED, REASON_FLEET_CONFIG_FAILED, REASON_GIT_CLONE_FAILED,
    REASON_GIT_COMMIT_FAILED, REASON_GIT_INITIALIZATION_FAILED, REASON_GIT_PUSH_FAILED,
    REASON_GIT_REMOTE_CHECK_FAILED, REASON_NEW_GIT_CLIENT_FAILED, REASON_SUCCESS,
};
use crate::context::Context;
use crate::crd::{Deployment, DeploymentStatus};
use crate::git::{credentials::credential_source, GitClient, GitError};
use crate::labels::FINALIZER_GIT_REMOTE;
use crate::reconcilers::finalizers::{contains_finalizer, remove_finalizer};
use crate::reconcilers::status::update_status_condition;

/// A repository step failure, tagged with the condition reason for it.
struct StepError {
    reason: &'static str,
    error: anyhow::Error,
}

impl StepError {
    fn new(reason: &'static str, error: impl Into<anyhow::Error>) -> Self {
        StepError {
            reason,
            error: error.into(),
        }
    }
}

/// Build the git client for one deployment, resolving credentials from the
/// configured source and the cached CA bundle.
pub(crate) async fn build_git_client(ctx: &Context, deployment_id: &str) -> Result<GitClient> {
    let source = credential_source(&ctx.config, ctx.http_client.clone())?;
    let credentials = source.git_credentials().await?;
    let cached_ca = ctx.ca_certs.get().await;
    let base_dir = std::env::temp_dir().join(deployment_id);
    Ok(GitClient::new(
        &ctx.config,
        ctx.http_client.clone(),
        deployment_id,
        base_dir,
        credentials,
        cached_ca,
    )?)
}

/// Synchronize the remote repository with the deployment spec and record the
/// outcome in the `GitSynced` condition.
pub async fn reconcile_repository(ctx: &Context, d: &mut Deployment) -> Result<()> {
    let outcome = sync_repository(ctx, d).await;
    let status = d.status.get_or_insert_with(DeploymentStatus::default);
    match outcome {
        Ok(()) => {
            update_status_condition(
                &mut status.conditions,
                CONDITION_GIT_SYNCED,
                "True",
                REASON_SUCCESS,
                None,
            );
            Ok(())
        }
        Err(step) => {
            let message = format!("{:#}", step.error);
            update_status_condition(
                &mut status.conditions,
                CONDITION_GIT_SYNCED,
                "False",
                step.reason,
                Some(message),
            );
            Err(step.error)
        }
    }
}

async fn sync_repository(ctx: &Context, d: &Deployment) -> Result<(), StepError> {
    let deployment_id = d.deployment_id();
    let scratch = std::env::temp_dir().join(&deployment_id);
    match tokio::fs::remove_dir_all(&scratch).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(StepError::new(
                REASON_GIT_INITIALIZATION_FAILED,
                anyhow!("failed to clear scratch directory {}: {e}", scratch.display()),
            ))
        }
    }

    let client = build_git_client(ctx, &deployment_id)
        .await
        .map_err(|e| StepError::new(REASON_NEW_GIT_CLIENT_FAILED, e))?;

    let exists = client
        .exists_on_remote()
        .await
        .map_err(|e| StepError::new(REASON_GIT_REMOTE_CHECK_FAILED, e))?;
    if exists {
        debug!(deployment = %deployment_id, "Remote exists, cloning");
        client
            .clone_from_remote()
            .await
            .map_err(|e| StepError::new(REASON_GIT_CLONE_FAILED, e))?;
    } else {
        debug!(deployment = %deployment_id, "Remote absent, initializing repository");
        client
            .initialize()
            .await
            .map_err(|e| StepError::new(REASON_GIT_INITIALIZATION_FAILED, e))?;
    }

    let secrets = KubeSecretReader::new(ctx.client.clone());
    let projects = RuntimeProjectLookup::new(ctx.client.clone());
    generate_fleet_configs(d, client.base_dir(), &secrets, &projects, &ctx.config)
        .await
        .map_err(|e| StepError::new(REASON_FLEET_CONFIG_FAILED, e))?;

    client
        .commit_files()
        .await
        .map_err(|e| StepError::new(REASON_GIT_COMMIT_FAILED, e))?;
    client
        .push_to_remote()
        .await
        .map_err(|e| StepError::new(REASON_GIT_PUSH_FAILED, e))?;

    info!(deployment = %deployment_id, "Pushed generated fleet configs");
    Ok(())
}

/// Delete the remote repository and release the git-remote finalizer. A
/// remote that is already gone counts as deleted.
pub async fn handle_git_remote_finalizer(ctx: &Context, d: &mut Deployment) -> Result<()> {
    if !contains_finalizer(&d.metadata, FINALIZER_GIT_REMOTE) {
        return Ok(());
    }

    let deployment_id = d.deployment_id();
    let client = build_git_client(ctx, &deployment_id).await?;
    if client.exists_on_remote().await? {
        match client.delete().await {
            Ok(()) => info!(deployment = %deployment_id, "Deleted remote repository"),
            Err(GitError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    remove_finalizer(&mut d.metadata, FINALIZER_GIT_REMOTE);
    Ok(())
}
