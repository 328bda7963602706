// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Force-resync of stuck bundles.
//!
//! The CD engine occasionally wedges a binding: a poll job that died with
//! "Unable to continue", or a `Stalled` rollout. Bumping the binding's
//! `forceSyncGeneration` makes the engine start over. Runs only while a
//! rollout is in progress and at most once per interval per deployment.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Duration, Utc};
use kube::api::{Api, PostParams};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::constants::{CONDITION_READY, CONDITION_STALLED, FORCE_RESYNC_INTERVAL_SECS};
use crate::context::Context;
use crate::crd::{Deployment, DeploymentStatus};
use crate::fleet::GitRepo;
use crate::reconcilers::deployment::gitrepo::{app_name_for_git_repo, owned_git_repos};
use crate::reconcilers::deployment::publish_event;
use crate::reconcilers::status::find_condition;

/// Nudge bindings the CD engine reports as stuck.
pub async fn force_resync_stuck_apps(ctx: &Context, d: &mut Deployment) -> Result<()> {
    let now = Utc::now();
    {
        let status = d.status.get_or_insert_with(DeploymentStatus::default);
        let Some(last_raw) = status.last_force_resync.clone() else {
            // First pass just starts the clock.
            status.last_force_resync = Some(now.to_rfc3339());
            return Ok(());
        };
        let last = DateTime::parse_from_rfc3339(&last_raw)
            .with_context(|| format!("failed to parse lastForceResync '{last_raw}'"))?
            .with_timezone(&Utc);
        if now - last < Duration::seconds(FORCE_RESYNC_INTERVAL_SECS) {
            return Ok(());
        }
    }

    let deployment_id = d.deployment_id();
    let namespace = d.namespace().context("deployment has no namespace")?;
    let api: Api<GitRepo> = Api::namespaced(ctx.client.clone(), &namespace);

    for mut repo in owned_git_repos(ctx, d).await? {
        if !is_stuck(&repo) {
            continue;
        }
        let app = app_name_for_git_repo(&repo.name_any(), &deployment_id);
        repo.spec.force_sync_generation = Some(repo.spec.force_sync_generation.unwrap_or(0) + 1);
        let name = repo.name_any();
        if let Err(e) = api.replace(&name, &PostParams::default(), &repo).await {
            warn!(binding = %name, app = %app, "Failed to force resync: {e}");
            return Err(e.into());
        }
        info!(binding = %name, app = %app, "Forced resync of stuck app");
        d.status.get_or_insert_with(DeploymentStatus::default).last_force_resync =
            Some(Utc::now().to_rfc3339());
        publish_event(
            ctx,
            d,
            EventType::Normal,
            "Reconciling",
            format!("Force sync triggered for app {app}"),
        )
        .await;
    }
    Ok(())
}

/// A binding is stuck when its poll job died ("Unable to continue" on Ready)
/// or the engine flagged the rollout as Stalled.
fn is_stuck(repo: &GitRepo) -> bool {
    let Some(status) = repo.status.as_ref() else {
        return false;
    };
    if let Some(ready) = find_condition(&status.conditions, CONDITION_READY) {
        if ready.status == "False"
            && ready
                .message
                .as_deref()
                .is_some_and(|m| m.contains("Unable to continue"))
        {
            return true;
        }
    }
    find_condition(&status.conditions, CONDITION_STALLED).is_some_and(|c| c.status == "True")
}

#[cfg(test)]
#[path = "resync_tests.rs"]
mod resync_tests;
