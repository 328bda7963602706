// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Deployment reconciler.
//!
//! Converts a `Deployment` into a per-deployment Git repository of fleet
//! configs plus one `GitRepo` binding per application, then aggregates the
//! rollout state reported back by the CD engine.
//!
//! A reconcile pass runs up to four phases, collecting errors instead of
//! aborting so one broken phase cannot freeze the others:
//!
//! 1. state bookkeeping (Deploying/Updating, conditions reset)
//! 2. dependency bookkeeping on child deployments
//! 3. regenerate, commit and push the fleet configs
//! 4. converge the `GitRepo` bindings
//!
//! A converged deployment short-circuits all four phases and only force-resyncs
//! bundles the CD engine reported as stuck. Status aggregation and the status
//! patch run on every pass, converged or not.

pub mod aggregate;
pub mod dependency;
pub mod gitrepo;
pub mod repository;
pub mod resync;

use anyhow::{anyhow, Context as _, Result};
use kube::api::{Api, ListParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, CatalogError};
use crate::constants::{
    CONDITION_READY, ERROR_REQUEUE_DURATION_SECS, READY_REQUEUE_DURATION_SECS, READY_WAIT_SECS,
    REASON_FAILED, REASON_SUCCESS,
};
use crate::context::{Context, DeploymentMeta};
use crate::crd::{Deployment, DeploymentStatus, StateType};
use crate::labels::{FINALIZER_CATALOG, FINALIZER_DEPENDENCY, FINALIZER_GIT_REMOTE, LABEL_ACTIVE_PROJECT_ID};
use crate::metrics;
use crate::patch::{PatchHelper, PatchOptions};
use crate::reconcilers::finalizers::{add_finalizer, contains_finalizer, remove_finalizer};
use crate::reconcilers::status::update_status_condition;

/// Reconcile one `Deployment`.
pub async fn reconcile_deployment(ctx: Arc<Context>, deployment: Deployment) -> Result<Action> {
    let name = deployment.name_any();
    let namespace = deployment
        .namespace()
        .context("deployment has no namespace")?;
    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut d = deployment;
    let helper = PatchHelper::new(&d)?;

    if d.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&ctx, &api, &helper, &mut d, &namespace, &name).await;
    }

    // Finalizers go on one at a time; each addition is persisted before any
    // side effect that the finalizer guards.
    if ctx.config.delete_repo_on_terminate && add_finalizer(&mut d.metadata, FINALIZER_GIT_REMOTE) {
        debug!(deployment = %name, "Adding git-remote finalizer");
        helper.patch(&api, &d, PatchOptions::default()).await?;
        return Ok(Action::await_change());
    }
    if add_finalizer(&mut d.metadata, FINALIZER_DEPENDENCY) {
        debug!(deployment = %name, "Adding dependency finalizer");
        helper.patch(&api, &d, PatchOptions::default()).await?;
        return Ok(Action::await_change());
    }
    if CatalogClient::from_config(&ctx.config, ctx.http_client.clone()).is_some()
        && add_finalizer(&mut d.metadata, FINALIZER_CATALOG)
    {
        debug!(deployment = %name, "Adding catalog finalizer");
        helper.patch(&api, &d, PatchOptions::default()).await?;
        return Ok(Action::await_change());
    }

    let generation = d.metadata.generation.unwrap_or(0);
    let reconciled = d.status.as_ref().and_then(|s| s.reconciled_generation);
    let first_clean_reconcile = reconciled.is_none();
    let mut errors: Vec<anyhow::Error> = Vec::new();

    // A converged deployment only needs the stuck-bundle nudge; a failed URL
    // probe falls through to the full reconcile, which surfaces the failure
    // as a GitSynced condition.
    let short_circuit = d.is_ready()
        && reconciled == Some(generation)
        && gitrepo::git_url_has_changed(&ctx, &d)
            .await
            .map(|changed| !changed)
            .unwrap_or(false);

    if short_circuit {
        debug!(deployment = %name, "Deployment converged, skipping reconcile phases");
        if d.status.as_ref().is_some_and(|s| s.deploy_in_progress) {
            if let Err(e) = resync::force_resync_stuck_apps(&ctx, &mut d).await {
                errors.push(e);
            }
        }
    } else {
        publish_event(
            &ctx,
            &d,
            EventType::Normal,
            "Reconciling",
            format!("Reconciling deployment {}", d.spec.display_name),
        )
        .await;
        reconcile_state(&mut d);
        if let Err(e) = dependency::reconcile_dependency(&ctx, &d).await {
            errors.push(e);
        }
        if let Err(e) = repository::reconcile_repository(&ctx, &mut d).await {
            errors.push(e);
        }
        if let Err(e) = gitrepo::reconcile_git_repos(&ctx, &mut d).await {
            errors.push(e);
        }

        let status = d.status.get_or_insert_with(DeploymentStatus::default);
        if errors.is_empty() {
            status.reconciled_generation = Some(generation);
            update_status_condition(
                &mut status.conditions,
                CONDITION_READY,
                "True",
                REASON_SUCCESS,
                None,
            );
        } else {
            update_status_condition(
                &mut status.conditions,
                CONDITION_READY,
                "False",
                REASON_FAILED,
                Some(join_errors(&errors)),
            );
        }

        if errors.is_empty() && first_clean_reconcile {
            mark_package_deployed(&ctx, &d).await;
        }
    }

    let requeue_status = match aggregate::update_status(&ctx, &mut d).await {
        Ok(flag) => flag,
        Err(e) => {
            errors.push(e);
            false
        }
    };

    let project_id = d
        .labels()
        .get(LABEL_ACTIVE_PROJECT_ID)
        .cloned()
        .unwrap_or_default();
    if let Some(state) = d.status.as_ref().and_then(|s| s.state.as_ref()) {
        metrics::set_deployment_status(&d.deployment_id(), &project_id, &state.to_string());
    }
    ctx.metadata_cache
        .cache(
            &format!("{namespace}/{name}"),
            DeploymentMeta {
                deployment_id: d.deployment_id(),
                project_id,
                created: d.metadata.creation_timestamp.as_ref().and_then(|t| {
                    chrono::DateTime::from_timestamp(
                        t.0.as_second(),
                        t.0.subsec_nanosecond() as u32,
                    )
                }),
            },
        )
        .await;

    helper
        .patch(
            &api,
            &d,
            PatchOptions {
                include_status_observed_generation: true,
            },
        )
        .await?;

    if !errors.is_empty() {
        let joined = join_errors(&errors);
        publish_event(&ctx, &d, EventType::Warning, "ReconcileError", joined.clone()).await;
        return Err(anyhow!("{joined}"));
    }

    if requeue_status {
        // Aggregation saw a row inside the ready-debounce window; look again
        // shortly instead of waiting for another watch event.
        return Ok(Action::requeue(Duration::from_secs(READY_WAIT_SECS as u64)));
    }
    if d.is_ready() {
        Ok(Action::requeue(Duration::from_secs(
            READY_REQUEUE_DURATION_SECS,
        )))
    } else {
        Ok(Action::requeue(Duration::from_secs(
            ERROR_REQUEUE_DURATION_SECS,
        )))
    }
}

/// Run the finalizer cleanup handlers and release the finalizers whose
/// cleanup succeeded.
async fn handle_deletion(
    ctx: &Context,
    api: &Api<Deployment>,
    helper: &PatchHelper,
    d: &mut Deployment,
    namespace: &str,
    name: &str,
) -> Result<Action> {
    info!(deployment = %name, "Deployment is terminating, running finalizer cleanup");

    let mut errors: Vec<anyhow::Error> = Vec::new();
    if let Err(e) = dependency::handle_dependency_finalizer(ctx, d).await {
        errors.push(e);
    }
    if let Err(e) = repository::handle_git_remote_finalizer(ctx, d).await {
        errors.push(e);
    }
    if let Err(e) = handle_catalog_finalizer(ctx, d).await {
        errors.push(e);
    }

    d.status.get_or_insert_with(DeploymentStatus::default).state = Some(StateType::Terminating);
    helper.patch(api, d, PatchOptions::default()).await?;

    if d.metadata.finalizers.as_ref().map_or(true, Vec::is_empty) {
        let key = format!("{namespace}/{name}");
        let meta = ctx.metadata_cache.get_and_remove(&key).await;
        let (deployment_id, project_id) = match meta {
            Some(meta) => (meta.deployment_id, meta.project_id),
            None => (
                d.deployment_id(),
                d.labels()
                    .get(LABEL_ACTIVE_PROJECT_ID)
                    .cloned()
                    .unwrap_or_default(),
            ),
        };
        metrics::remove_deployment_status(&deployment_id, &project_id);
    }

    if errors.is_empty() {
        Ok(Action::await_change())
    } else {
        Err(anyhow!("{}", join_errors(&errors)))
    }
}

/// Move the state machine for a non-converged deployment: first generation
/// deploys, later generations update. Conditions are reset so this pass
/// re-derives all of them.
fn reconcile_state(d: &mut Deployment) {
    let generation = d.metadata.generation.unwrap_or(0);
    let status = d.status.get_or_insert_with(DeploymentStatus::default);
    let state = if status.state.is_none() || generation == 1 {
        StateType::Deploying
    } else {
        StateType::Updating
    };
    status.state = Some(state);
    status.conditions.clear();
    status.deploy_in_progress = true;
}

/// Clear the catalog's `isDeployed` flag when this was the last deployment of
/// its package, then release the finalizer. A package already gone from the
/// catalog counts as cleaned up.
async fn handle_catalog_finalizer(ctx: &Context, d: &mut Deployment) -> Result<()> {
    if !contains_finalizer(&d.metadata, FINALIZER_CATALOG) {
        return Ok(());
    }

    if let Some(catalog) = CatalogClient::from_config(&ctx.config, ctx.http_client.clone()) {
        if let Some(project_id) = d.labels().get(LABEL_ACTIVE_PROJECT_ID).cloned() {
            if !package_still_referenced(ctx, d).await? {
                let package = &d.spec.deployment_package_ref;
                match catalog
                    .update_is_deployed(&project_id, &package.name, &package.version, false)
                    .await
                {
                    Ok(()) => {}
                    Err(CatalogError::NotFound(pkg)) => {
                        debug!(package = %pkg, "Package already gone from catalog");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    remove_finalizer(&mut d.metadata, FINALIZER_CATALOG);
    Ok(())
}

/// Whether another deployment in the same project still uses this
/// deployment's package version.
async fn package_still_referenced(ctx: &Context, d: &Deployment) -> Result<bool> {
    let api: Api<Deployment> = Api::all(ctx.client.clone());
    let mut params = ListParams::default();
    if let Some(project_id) = d.labels().get(LABEL_ACTIVE_PROJECT_ID) {
        params = params.labels(&format!("{LABEL_ACTIVE_PROJECT_ID}={project_id}"));
    }
    let list = api.list(&params).await?;

    let package = &d.spec.deployment_package_ref;
    Ok(list.into_iter().any(|other| {
        other.metadata.uid != d.metadata.uid
            && other.spec.deployment_package_ref.name == package.name
            && other.spec.deployment_package_ref.version == package.version
    }))
}

/// Flag the package as deployed in the catalog. Bookkeeping only; a failure
/// is logged and never fails the reconcile.
async fn mark_package_deployed(ctx: &Context, d: &Deployment) {
    let Some(catalog) = CatalogClient::from_config(&ctx.config, ctx.http_client.clone()) else {
        return;
    };
    let Some(project_id) = d.labels().get(LABEL_ACTIVE_PROJECT_ID) else {
        return;
    };
    let package = &d.spec.deployment_package_ref;
    if let Err(e) = catalog
        .update_is_deployed(project_id, &package.name, &package.version, true)
        .await
    {
        warn!(package = %package.name, version = %package.version, "Failed to set catalog deployed flag: {e}");
    }
}

pub(crate) async fn publish_event(
    ctx: &Context,
    d: &Deployment,
    type_: EventType,
    reason: &str,
    note: String,
) {
    let recorder = Recorder::new(
        ctx.client.clone(),
        Reporter {
            controller: "admiral-deployment-controller".to_string(),
            instance: None,
        },
    );
    let event = Event {
        type_,
        reason: reason.to_string(),
        note: Some(note),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(&event, &d.object_ref(&())).await {
        warn!(deployment = %d.name_any(), "Failed to publish event: {e}");
    }
}

fn join_errors(errors: &[anyhow::Error]) -> String {
    errors
        .iter()
        .map(|e| format!("{e:#}"))
        .collect::<Vec<_>>()
        .join("; ")
}
