// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Cluster reconciler.
//!
//! Watches the CD engine's cluster records and maintains one internal
//! [`Cluster`] per record. The internal cluster mirrors the record's labels
//! and rollout status and derives a liveness state from the agent heartbeat:
//! a cluster whose agent has not checked in within the configured interval is
//! marked `Unknown`, which the deployment-cluster reconciler folds into every
//! deployment targeting it.
//!
//! The internal cluster is owned by the fleet record, so deletion of the
//! record garbage-collects the mirror without reconciler involvement.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{CONDITION_READY, REASON_CLUSTER_STATUS_UNKNOWN, REASON_SUCCESS};
use crate::context::Context;
use crate::crd::{
    Cluster, ClusterSpec, ClusterStatus, FleetAgentStatus, FleetClusterDisplay, FleetStatus,
    StateType,
};
use crate::fleet;
use crate::labels::{LABEL_ACTIVE_PROJECT_ID, LABEL_CLUSTER_NAME, LABEL_CLUSTER_ORCH_PROJECT_ID};
use crate::patch::{PatchHelper, PatchOptions};
use crate::reconcilers::status::update_status_condition;

const AGENT_SILENT_MESSAGE: &str = "cluster agent stopped reporting";

/// Reconcile one fleet cluster record into its internal [`Cluster`] mirror.
///
/// Returns a checkin-interval requeue when the agent heartbeat advanced, so
/// a subsequently silent agent still gets flagged `Unknown` without another
/// watch event.
pub async fn reconcile_cluster(ctx: Arc<Context>, fleet_cluster: fleet::Cluster) -> Result<Action> {
    let name = fleet_cluster.name_any();
    let namespace = fleet_cluster
        .namespace()
        .context("fleet cluster has no namespace")?;

    if fleet_cluster.metadata.deletion_timestamp.is_some() {
        // Owner reference on the mirror handles the cascade.
        debug!(cluster = %name, "Fleet cluster is terminating, nothing to do");
        return Ok(Action::await_change());
    }

    let clusters: Api<Cluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let mut cluster = match clusters.get_opt(&name).await? {
        Some(existing) => existing,
        None => {
            info!(cluster = %name, namespace = %namespace, "Creating cluster mirror for fleet cluster");
            let desired = new_cluster(&fleet_cluster, &name, &namespace);
            clusters.create(&PostParams::default(), &desired).await?
        }
    };

    if cluster.metadata.deletion_timestamp.is_some() {
        debug!(cluster = %name, "Cluster mirror is terminating, skipping");
        return Ok(Action::await_change());
    }

    let helper = PatchHelper::new(&cluster)?;
    let previous_last_seen = cluster
        .status
        .as_ref()
        .and_then(|s| s.fleet_status.fleet_agent_status.last_seen.clone());

    synchronize_metadata(&mut cluster, &fleet_cluster);
    cluster.spec = desired_spec(&fleet_cluster);

    let now = Utc::now();
    let last_seen = fleet_cluster
        .status
        .as_ref()
        .and_then(|s| s.agent.last_seen.clone());
    let connected = agent_connected(last_seen.as_deref(), ctx.config.fleet_agent_checkin, now);

    let status = cluster.status.get_or_insert_with(ClusterStatus::default);
    status.fleet_status = mirror_fleet_status(&fleet_cluster);
    if connected {
        status.state = Some(StateType::Running);
        status.message = None;
        update_status_condition(
            &mut status.conditions,
            CONDITION_READY,
            "True",
            REASON_SUCCESS,
            None,
        );
    } else {
        status.state = Some(StateType::Unknown);
        status.message = Some(AGENT_SILENT_MESSAGE.to_string());
        update_status_condition(
            &mut status.conditions,
            CONDITION_READY,
            "False",
            REASON_CLUSTER_STATUS_UNKNOWN,
            Some(AGENT_SILENT_MESSAGE.to_string()),
        );
    }
    status.last_status_update = Some(now.to_rfc3339());
    status.fleet_observed_generation = fleet_cluster.metadata.generation;

    helper
        .patch(
            &clusters,
            &cluster,
            PatchOptions {
                include_status_observed_generation: true,
            },
        )
        .await?;

    if heartbeat_advanced(previous_last_seen.as_deref(), last_seen.as_deref()) {
        debug!(cluster = %name, "Agent heartbeat advanced, scheduling liveness recheck");
        Ok(Action::requeue(ctx.config.fleet_agent_checkin))
    } else {
        Ok(Action::await_change())
    }
}

/// A fresh mirror for a fleet cluster record that has none yet.
fn new_cluster(fleet_cluster: &fleet::Cluster, name: &str, namespace: &str) -> Cluster {
    let mut cluster = Cluster::new(name, desired_spec(fleet_cluster));
    cluster.metadata.namespace = Some(namespace.to_string());
    synchronize_metadata(&mut cluster, fleet_cluster);
    cluster
}

/// Mirror labels and ownership from the fleet record onto the cluster.
fn synchronize_metadata(cluster: &mut Cluster, fleet_cluster: &fleet::Cluster) {
    let mirrored = mirrored_labels(fleet_cluster);
    cluster
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(mirrored);

    if let Some(owner) = fleet_cluster.controller_owner_ref(&()) {
        let owners = cluster.metadata.owner_references.get_or_insert_with(Vec::new);
        if !owners.iter().any(|o| o.uid == owner.uid) {
            owners.push(owner);
        }
    }
}

/// The fleet record's labels, with the cluster-orchestrator project id
/// re-stamped as the app-orchestration active project id.
fn mirrored_labels(fleet_cluster: &fleet::Cluster) -> BTreeMap<String, String> {
    let mut labels = fleet_cluster.labels().clone();
    if let Some(project_id) = labels.get(LABEL_CLUSTER_ORCH_PROJECT_ID).cloned() {
        labels.insert(LABEL_ACTIVE_PROJECT_ID.to_string(), project_id);
    }
    labels
}

fn desired_spec(fleet_cluster: &fleet::Cluster) -> ClusterSpec {
    let name = fleet_cluster.name_any();
    let display_name = fleet_cluster
        .labels()
        .get(LABEL_CLUSTER_NAME)
        .cloned()
        .unwrap_or_else(|| name.clone());
    ClusterSpec {
        name: Some(name),
        display_name: Some(display_name),
        kube_config_secret_name: fleet_cluster.spec.kube_config_secret.clone(),
    }
}

/// Snapshot the fleet record's status block for the mirror.
fn mirror_fleet_status(fleet_cluster: &fleet::Cluster) -> FleetStatus {
    let Some(status) = fleet_cluster.status.as_ref() else {
        return FleetStatus::default();
    };
    FleetStatus {
        cluster_display: FleetClusterDisplay {
            ready_bundles: status.display.ready_bundles.clone(),
            state: status.display.state.clone(),
        },
        fleet_agent_status: FleetAgentStatus {
            last_seen: status.agent.last_seen.clone(),
            namespace: status.agent.namespace.clone(),
        },
        conditions: status.conditions.clone(),
    }
}

/// Whether the agent checked in within the checkin interval. A missing or
/// unparseable heartbeat counts as disconnected.
fn agent_connected(last_seen: Option<&str>, checkin: Duration, now: DateTime<Utc>) -> bool {
    let Some(raw) = last_seen else {
        return false;
    };
    let Ok(stamp) = DateTime::parse_from_rfc3339(raw) else {
        return false;
    };
    let elapsed = now - stamp.with_timezone(&Utc);
    elapsed.num_seconds() <= checkin.as_secs() as i64
}

fn heartbeat_advanced(previous: Option<&str>, current: Option<&str>) -> bool {
    match (previous, current) {
        (Some(prev), Some(cur)) => prev != cur,
        (None, Some(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
