// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! DeploymentCluster reconciler.
//!
//! A `DeploymentCluster` is a synthesized status row for one
//! `(deployment, target cluster)` pair. Its name is derived deterministically
//! from the pair, so the bundle-deployment watcher can create rows without
//! coordination and every reconcile re-projects the row from scratch:
//!
//! 1. the row's cluster disappeared: delete the row
//! 2. collect the app bundle deployments whose derived name matches
//! 3. no apps remain: delete the row
//! 4. cluster heartbeat is Unknown: the whole row is Unknown
//! 5. otherwise aggregate per-app Running/Down into the row state
//!
//! The row owns nothing; deleting it loses no information.

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::{
    CONDITION_READY, REASON_BUNDLE_DEPLOYMENTS_NOT_READY, REASON_BUNDLE_DEPLOYMENTS_READY,
    REASON_CLUSTER_STATUS_UNKNOWN,
};
use crate::context::Context;
use crate::crd::{
    App, Cluster, DeploymentCluster, DeploymentClusterSpec, DeploymentClusterStatus, StateType,
    Summary,
};
use crate::fleet::BundleDeployment;
use crate::labels::{
    BUNDLE_TYPE_APP, BUNDLE_TYPE_INIT, LABEL_ACTIVE_PROJECT_ID, LABEL_APP_NAME, LABEL_BUNDLE_NAME,
    LABEL_BUNDLE_TYPE, LABEL_CLUSTER_NAME, LABEL_DEPLOYMENT_GENERATION, LABEL_DEPLOYMENT_ID,
    LABEL_FLEET_CLUSTER, LABEL_FLEET_CLUSTER_NAMESPACE,
};
use crate::patch::{PatchHelper, PatchOptions};
use crate::reconcilers::status::{append_message, condition_is_true, update_status_condition};

/// Deterministic `DeploymentCluster` name for a `(deployment, cluster)` pair.
///
/// The deployment id must itself be a UUID; the cluster id is hashed into its
/// namespace, so the same pair always resolves to the same 39-character name.
///
/// # Errors
///
/// Returns an error when the deployment id is not a UUID.
pub fn deployment_cluster_name(deployment_id: &str, cluster_id: &str) -> Result<String> {
    let namespace = Uuid::parse_str(deployment_id)
        .with_context(|| format!("deployment id '{deployment_id}' is not a UUID"))?;
    Ok(format!(
        "dc-{}",
        Uuid::new_v5(&namespace, cluster_id.as_bytes())
    ))
}

/// Identity of a `DeploymentCluster` row, read off an app bundle deployment's
/// labels.
struct RowIdentity {
    name: String,
    deployment_id: String,
    cluster_id: String,
    cluster_namespace: String,
}

/// Extract the row identity from a bundle deployment. Returns `None` for
/// bundle deployments that do not carry the full label set (foreign bundles).
fn row_identity(bd: &BundleDeployment) -> Result<Option<RowIdentity>> {
    let labels = bd.labels();
    let (Some(deployment_id), Some(cluster_id), Some(cluster_namespace)) = (
        labels.get(LABEL_DEPLOYMENT_ID),
        labels.get(LABEL_FLEET_CLUSTER),
        labels.get(LABEL_FLEET_CLUSTER_NAMESPACE),
    ) else {
        return Ok(None);
    };
    let name = deployment_cluster_name(deployment_id, cluster_id)?;
    Ok(Some(RowIdentity {
        name,
        deployment_id: deployment_id.clone(),
        cluster_id: cluster_id.clone(),
        cluster_namespace: cluster_namespace.clone(),
    }))
}

/// Create the `DeploymentCluster` row for an app bundle deployment if it does
/// not exist yet. Invoked from the bundle-deployment watcher.
///
/// # Errors
///
/// Fails when the bundle deployment belongs to a deployment but lacks the
/// active-project-id label, or on API errors other than a concurrent create.
pub async fn create_for_bundle_deployment(ctx: Arc<Context>, bd: BundleDeployment) -> Result<()> {
    if bd.labels().get(LABEL_BUNDLE_TYPE).map(String::as_str) == Some(BUNDLE_TYPE_INIT) {
        return Ok(());
    }
    let Some(identity) = row_identity(&bd)? else {
        return Ok(());
    };
    let namespace = bd
        .namespace()
        .context("bundle deployment has no namespace")?;

    let rows: Api<DeploymentCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    if rows.get_opt(&identity.name).await?.is_some() {
        return Ok(());
    }

    let Some(project_id) = bd.labels().get(LABEL_ACTIVE_PROJECT_ID).cloned() else {
        bail!(
            "bundle deployment {}/{} has no {} label",
            namespace,
            bd.name_any(),
            LABEL_ACTIVE_PROJECT_ID
        );
    };

    let mut row = DeploymentCluster::new(
        &identity.name,
        DeploymentClusterSpec {
            deployment_id: identity.deployment_id.clone(),
            cluster_id: identity.cluster_id.clone(),
            namespace: Some(identity.cluster_namespace.clone()),
        },
    );
    row.metadata.namespace = Some(namespace.clone());
    row.metadata.labels = Some(BTreeMap::from([
        (LABEL_DEPLOYMENT_ID.to_string(), identity.deployment_id),
        (LABEL_CLUSTER_NAME.to_string(), identity.cluster_id),
        (LABEL_ACTIVE_PROJECT_ID.to_string(), project_id),
    ]));

    info!(row = %identity.name, namespace = %namespace, "Creating deployment cluster row");
    match rows.create(&PostParams::default(), &row).await {
        Ok(_) => Ok(()),
        // Another watcher event won the race.
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Re-project one `DeploymentCluster` row from its bundle deployments.
pub async fn reconcile_deployment_cluster(
    ctx: Arc<Context>,
    mut row: DeploymentCluster,
) -> Result<Action> {
    let name = row.name_any();
    let namespace = row
        .namespace()
        .context("deployment cluster has no namespace")?;

    if row.metadata.deletion_timestamp.is_some() {
        debug!(row = %name, "Deployment cluster is terminating, skipping");
        return Ok(Action::await_change());
    }

    let rows: Api<DeploymentCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let helper = PatchHelper::new(&row)?;

    let previous = row.status.take().unwrap_or_default();
    let mut status = DeploymentClusterStatus {
        state: Some(StateType::Running),
        conditions: previous.conditions,
        name: previous.name,
        ..DeploymentClusterStatus::default()
    };

    let cluster_namespace = row
        .spec
        .namespace
        .clone()
        .unwrap_or_else(|| namespace.clone());
    let clusters: Api<Cluster> = Api::namespaced(ctx.client.clone(), &cluster_namespace);
    let Some(cluster) = clusters.get_opt(&row.spec.cluster_id).await? else {
        info!(row = %name, cluster = %row.spec.cluster_id, "Target cluster is gone, deleting row");
        rows.delete(&name, &DeleteParams::default()).await?;
        return Ok(Action::await_change());
    };

    if let Some(display_name) = cluster.spec.display_name.clone() {
        status.name = Some(display_name);
    }

    let apps = collect_app_rows(&ctx, &namespace, &row).await?;
    if apps.is_empty() {
        info!(row = %name, "No app bundle deployments remain, deleting row");
        rows.delete(&name, &DeleteParams::default()).await?;
        return Ok(Action::await_change());
    }

    let summary = summarize(&apps);
    let cluster_unknown = cluster
        .status
        .as_ref()
        .and_then(|s| s.state.as_ref())
        .is_some_and(|s| *s == StateType::Unknown);

    if cluster_unknown {
        status.state = Some(StateType::Unknown);
        status.message = cluster.status.as_ref().and_then(|s| s.message.clone());
        update_status_condition(
            &mut status.conditions,
            CONDITION_READY,
            "False",
            REASON_CLUSTER_STATUS_UNKNOWN,
            status.message.clone(),
        );
    } else {
        let mut message = None;
        for app in &apps {
            if app.state == Some(StateType::Down) {
                if let Some(app_message) = app.message.as_deref() {
                    message = append_message(message, app_message);
                }
            }
        }
        if summary.down > 0 {
            status.state = Some(StateType::Down);
            status.message = message.clone();
            update_status_condition(
                &mut status.conditions,
                CONDITION_READY,
                "False",
                REASON_BUNDLE_DEPLOYMENTS_NOT_READY,
                message,
            );
        } else {
            status.state = Some(StateType::Running);
            status.message = None;
            update_status_condition(
                &mut status.conditions,
                CONDITION_READY,
                "True",
                REASON_BUNDLE_DEPLOYMENTS_READY,
                None,
            );
        }
    }

    status.display = Some(format!("{}/{}", summary.running, summary.total));
    status.summary = summary;
    status.apps = apps;
    status.last_status_update = Some(Utc::now().to_rfc3339());
    row.status = Some(status);

    helper
        .patch(&rows, &row, PatchOptions::default())
        .await?;
    Ok(Action::await_change())
}

/// Collect the per-app rows for this deployment cluster from the app bundle
/// deployments carrying its deployment id.
async fn collect_app_rows(
    ctx: &Context,
    namespace: &str,
    row: &DeploymentCluster,
) -> Result<Vec<App>> {
    let bundles: Api<BundleDeployment> = Api::namespaced(ctx.client.clone(), namespace);
    let selector = format!(
        "{}={},{}={}",
        LABEL_DEPLOYMENT_ID, row.spec.deployment_id, LABEL_BUNDLE_TYPE, BUNDLE_TYPE_APP
    );
    let list = bundles.list(&ListParams::default().labels(&selector)).await?;

    let row_name = row.name_any();
    let mut apps = Vec::new();
    for bd in list {
        let identity = match row_identity(&bd) {
            Ok(Some(identity)) => identity,
            Ok(None) => continue,
            Err(e) => {
                warn!(bundle = %bd.name_any(), "Skipping bundle deployment with bad labels: {e:#}");
                continue;
            }
        };
        if identity.name != row_name {
            continue;
        }
        apps.push(app_row(&bd));
    }
    apps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(apps)
}

fn app_row(bd: &BundleDeployment) -> App {
    let labels = bd.labels();
    let state = bundle_deployment_state(bd);
    let message = if state == StateType::Down {
        bundle_deployment_message(bd)
    } else {
        None
    };
    App {
        name: labels.get(LABEL_APP_NAME).cloned().unwrap_or_default(),
        id: labels.get(LABEL_BUNDLE_NAME).cloned(),
        state: Some(state),
        message,
        deployment_generation: deployment_generation(bd),
    }
}

/// Running/Down verdict for one app bundle deployment.
///
/// Running requires the CD engine's Ready condition, the applied content to
/// match the desired content, and either a clean ready status or the
/// modified-but-ready case where drift detection flagged resources the bundle
/// deliberately does not own.
fn bundle_deployment_state(bd: &BundleDeployment) -> StateType {
    let Some(status) = bd.status.as_ref() else {
        return StateType::Down;
    };
    if !condition_is_true(&status.conditions, CONDITION_READY) {
        return StateType::Down;
    }
    if bd.spec.deployment_id != status.applied_deployment_id {
        return StateType::Down;
    }
    let modified_but_ready =
        !status.non_modified && status.display.state.as_deref() == Some("Modified");
    if status.ready || modified_but_ready {
        StateType::Running
    } else {
        StateType::Down
    }
}

/// Accumulated messages of the failing conditions, for rows that are Down.
fn bundle_deployment_message(bd: &BundleDeployment) -> Option<String> {
    let status = bd.status.as_ref()?;
    if status.ready {
        return None;
    }
    let mut message = None;
    for condition in &status.conditions {
        if condition.status == "False" {
            if let Some(text) = condition.message.as_deref() {
                message = append_message(message, text);
            }
        }
    }
    message
}

/// The deployment generation stamped on the bundle, 0 when absent or
/// malformed.
fn deployment_generation(bd: &BundleDeployment) -> i64 {
    bd.labels()
        .get(LABEL_DEPLOYMENT_GENERATION)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}

fn summarize(apps: &[App]) -> Summary {
    let mut summary = Summary {
        total: apps.len() as i32,
        r#type: Some("app".to_string()),
        ..Summary::default()
    };
    for app in apps {
        match app.state {
            Some(StateType::Running) => summary.running += 1,
            Some(StateType::Unknown) => summary.unknown += 1,
            _ => summary.down += 1,
        }
    }
    summary
}

#[cfg(test)]
#[path = "deploymentcluster_tests.rs"]
mod deploymentcluster_tests;
