// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Deployment status aggregation.
//!
//! Runs at the end of every reconcile pass and rebuilds the deployment's
//! aggregate state from three inputs: its own conditions (phase outcomes and
//! poll-job verdicts), the `GitRepo` bindings, and the `DeploymentCluster`
//! rows carrying its deployment id.
//!
//! The CD engine does not surface poll-job pod failures on the binding, so
//! during a rollout the aggregation inspects the jobs and pods itself and
//! folds the verdicts into a `NotStalled` condition.
//!
//! A cluster row only counts as Running once every app row carries the
//! current deployment generation and the row's Ready condition has held past
//! the debounce window; a row inside the window requests a short requeue
//! instead of flapping the state.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::ResourceExt;
use std::collections::HashMap;

use crate::constants::{
    CONDITION_NOT_STALLED, CONDITION_READY, CONDITION_STALLED, NO_TARGET_CLUSTERS_WAIT_SECS,
    READY_WAIT_SECS, REASON_FAILED, REASON_SUCCESS,
};
use crate::context::Context;
use crate::crd::{Deployment, DeploymentCluster, DeploymentStatus, StateType, Summary};
use crate::fleet::GitRepo;
use crate::labels::LABEL_DEPLOYMENT_ID;
use crate::reconcilers::deployment::gitrepo::{app_name_for_git_repo, owned_git_repos};
use crate::reconcilers::status::{
    append_message, find_condition, seconds_since_transition, update_status_condition,
};

/// Scalar inputs to the state derivation, split off the deployment so the
/// derivation itself is a pure function.
struct StateInputs {
    deployment_id: String,
    generation: i64,
    created: Option<DateTime<Utc>>,
}

/// Poll-job verdict for one binding.
enum JobVerdict {
    Succeeded,
    Failed(String),
}

/// Recompute the deployment's aggregate status. Returns true when a cluster
/// row was inside the ready-debounce window and the caller should requeue
/// shortly.
pub async fn update_status(ctx: &Context, d: &mut Deployment) -> Result<bool> {
    let now = Utc::now();

    if d.metadata.deletion_timestamp.is_some() {
        d.status.get_or_insert_with(DeploymentStatus::default).state =
            Some(StateType::Terminating);
        return Ok(false);
    }

    let inputs = StateInputs {
        deployment_id: d.deployment_id(),
        generation: d.metadata.generation.unwrap_or(0),
        created: d
            .metadata
            .creation_timestamp
            .as_ref()
            .and_then(|t| DateTime::from_timestamp(t.0.as_second(), t.0.subsec_nanosecond() as u32)),
    };
    let namespace = d.namespace().context("deployment has no namespace")?;

    let repos = owned_git_repos(ctx, d).await?;
    let rows: Api<DeploymentCluster> = Api::all(ctx.client.clone());
    let row_list = rows
        .list(
            &ListParams::default()
                .labels(&format!("{}={}", LABEL_DEPLOYMENT_ID, inputs.deployment_id)),
        )
        .await?;

    let deploy_in_progress = d.status.as_ref().is_some_and(|s| s.deploy_in_progress);
    if deploy_in_progress {
        let verdicts = git_job_verdicts(ctx, &namespace, &inputs.deployment_id, &repos).await?;
        let status = d.status.get_or_insert_with(DeploymentStatus::default);
        apply_not_stalled(&mut status.conditions, &verdicts, repos.len());
    }

    let status = d.status.get_or_insert_with(DeploymentStatus::default);

    // A phase failure or a failed poll job makes the whole deployment an
    // operator-side error, regardless of what the clusters report.
    if let Some(failed) = status.conditions.iter().find(|c| c.status == "False") {
        status.message = failed.message.clone();
        status.state = Some(StateType::InternalError);
        status.last_status_update = Some(now.to_rfc3339());
        return Ok(false);
    }

    let requeue = derive_state(status, &inputs, &repos, &row_list.items, now);
    status.last_status_update = Some(now.to_rfc3339());
    Ok(requeue)
}

/// Inspect the poll jobs of all bindings and return per-binding verdicts.
/// Bindings whose job is still running get no verdict.
async fn git_job_verdicts(
    ctx: &Context,
    namespace: &str,
    deployment_id: &str,
    repos: &[GitRepo],
) -> Result<HashMap<String, JobVerdict>> {
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), namespace);
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), namespace);
    let job_list = jobs.list(&ListParams::default()).await?;

    let mut verdicts = HashMap::new();
    for repo in repos {
        let repo_name = repo.name_any();
        let Some(job) = job_list
            .items
            .iter()
            .find(|job| owned_by_git_job(job, &repo_name))
        else {
            continue;
        };

        if job.status.as_ref().and_then(|s| s.succeeded) == Some(1) {
            verdicts.insert(repo_name, JobVerdict::Succeeded);
            continue;
        }

        let job_name = job.name_any();
        let pod_list = pods
            .list(&ListParams::default().labels(&format!("job-name={job_name}")))
            .await?;
        let Some(pod) = latest_failed_pod(&pod_list.items) else {
            // Initializing or not ready yet; no verdict.
            continue;
        };

        let app = app_name_for_git_repo(&repo_name, deployment_id);
        if let Some(message) = terminated_error_message(pod) {
            verdicts.insert(repo_name, JobVerdict::Failed(format!("{app}: {message}")));
        }
    }
    Ok(verdicts)
}

fn owned_by_git_job(job: &Job, repo_name: &str) -> bool {
    job.metadata.owner_references.as_ref().is_some_and(|refs| {
        refs.iter()
            .any(|r| r.kind == "GitJob" && r.name == repo_name)
    })
}

fn latest_failed_pod(pods: &[Pod]) -> Option<&Pod> {
    pods.iter()
        .filter(|p| {
            p.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == "Failed")
        })
        .max_by_key(|p| p.metadata.creation_timestamp.as_ref().map(|t| t.0))
}

/// The error message of the one container that terminated with reason
/// "Error"; only one of the poll-job containers carries it.
fn terminated_error_message(pod: &Pod) -> Option<String> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find_map(|cs| {
            let terminated = cs.state.as_ref()?.terminated.as_ref()?;
            if terminated.reason.as_deref() == Some("Error") {
                terminated.message.clone().filter(|m| !m.is_empty())
            } else {
                None
            }
        })
}

/// Fold the poll-job verdicts into the `NotStalled` condition: any failure
/// flips it False; all bindings succeeding flips it True; a partial picture
/// leaves the condition untouched.
fn apply_not_stalled(
    conditions: &mut Vec<crate::crd::Condition>,
    verdicts: &HashMap<String, JobVerdict>,
    repo_count: usize,
) {
    let mut failures: Vec<&str> = verdicts
        .values()
        .filter_map(|v| match v {
            JobVerdict::Failed(message) => Some(message.as_str()),
            JobVerdict::Succeeded => None,
        })
        .collect();
    failures.sort_unstable();

    if !failures.is_empty() {
        update_status_condition(
            conditions,
            CONDITION_NOT_STALLED,
            "False",
            REASON_FAILED,
            Some(failures.join("; ")),
        );
    } else if verdicts.len() == repo_count {
        update_status_condition(conditions, CONDITION_NOT_STALLED, "True", REASON_SUCCESS, None);
    }
}

/// The deployment state machine. Mutates summary, display, message and state
/// on the status block; returns the requeue flag.
fn derive_state(
    status: &mut DeploymentStatus,
    inputs: &StateInputs,
    repos: &[GitRepo],
    rows: &[DeploymentCluster],
    now: DateTime<Utc>,
) -> bool {
    let mut stalled = false;
    let mut message: Option<String> = None;
    let apps = repos.len();

    for repo in repos {
        let app = app_name_for_git_repo(&repo.name_any(), &inputs.deployment_id);
        let Some(repo_status) = repo.status.as_ref() else {
            continue;
        };
        if status.deploy_in_progress {
            if let Some(c) = find_condition(&repo_status.conditions, CONDITION_STALLED) {
                if c.status == "True" {
                    stalled = true;
                    let text = c.message.as_deref().unwrap_or_default();
                    message = append_message(message, &format!("App {app}: {text}"));
                }
            }
        }
        if let Some(display) = repo_status.display.message.as_deref() {
            if !display.is_empty() {
                message = append_message(message, &format!("App {app}: {display}"));
            }
        }
    }

    if status.deploy_in_progress {
        if let Some(c) = find_condition(&status.conditions, CONDITION_NOT_STALLED) {
            if c.status == "False" {
                stalled = true;
                if let Some(text) = c.message.as_deref() {
                    message = append_message(message, text);
                }
            }
        }
    }

    let mut counts = Summary {
        total: rows.len() as i32,
        r#type: Some("cluster".to_string()),
        ..Summary::default()
    };
    let mut requeue = false;

    for row in rows {
        let Some(row_status) = row.status.as_ref() else {
            continue;
        };
        match row_status.state {
            Some(StateType::Unknown) => counts.unknown += 1,
            Some(StateType::Down) => {
                counts.down += 1;
                if let Some(row_message) = row_status.message.as_deref() {
                    if row_message.contains("Progress deadline exceeded") {
                        stalled = true;
                        message = append_message(message, row_message);
                    }
                }
            }
            Some(StateType::Running) => {
                let mut ready = row_status
                    .apps
                    .iter()
                    .all(|app| app.deployment_generation == inputs.generation);

                // Debounce: the row must hold Ready for a bit before it counts.
                let settled = find_condition(&row_status.conditions, CONDITION_READY)
                    .and_then(|c| seconds_since_transition(c, now))
                    .is_some_and(|elapsed| elapsed > READY_WAIT_SECS);
                if !settled {
                    requeue = true;
                    ready = false;
                }

                if ready {
                    counts.running += 1;
                } else {
                    counts.down += 1;
                }
            }
            _ => {}
        }
    }

    let state = if stalled {
        StateType::Error
    } else if counts.unknown > 0 {
        StateType::Unknown
    } else if counts.total == 0 {
        // Give the CD engine a bootstrap window before declaring the
        // selectors matched nothing.
        let past_grace = inputs.created.map_or(true, |created| {
            now > created + Duration::seconds(NO_TARGET_CLUSTERS_WAIT_SECS)
        });
        if past_grace {
            StateType::NoTargetClusters
        } else if status.deploy_in_progress {
            StateType::Deploying
        } else {
            StateType::NoTargetClusters
        }
    } else if counts.down > 0 || counts.total > counts.running {
        if status.deploy_in_progress {
            if inputs.generation <= 1 {
                StateType::Deploying
            } else {
                StateType::Updating
            }
        } else {
            StateType::Down
        }
    } else {
        status.deploy_in_progress = false;
        StateType::Running
    };

    status.display = Some(format!(
        "Clusters: {}/{}/{}/{}, Apps: {}",
        counts.total, counts.running, counts.down, counts.unknown, apps
    ));
    status.message = message;
    status.summary = counts;
    status.state = Some(state);
    requeue
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod aggregate_tests;
