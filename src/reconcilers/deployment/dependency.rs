// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Parent/child dependency bookkeeping.
//!
//! A deployment can declare child deployments it depends on. Each child keeps
//! a `parentDeploymentList` in its status so the platform can refuse to tear
//! down a child while parents still reference it. The reconcile phase keeps
//! the parent's entry in every child current; the finalizer removes it on
//! teardown, tolerating children that are already gone.

use anyhow::{bail, Context as _, Result};
use kube::api::Api;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::context::Context;
use crate::crd::{Deployment, DeploymentStatus};
use crate::labels::FINALIZER_DEPENDENCY;
use crate::patch::{PatchHelper, PatchOptions};
use crate::reconcilers::finalizers::{contains_finalizer, remove_finalizer};

/// Ensure each declared child carries this deployment's parent entry.
///
/// # Errors
///
/// Fails when a declared child does not exist or a status patch fails.
pub async fn reconcile_dependency(ctx: &Context, d: &Deployment) -> Result<()> {
    let Some(children) = d.spec.child_deployment_list.as_ref() else {
        return Ok(());
    };
    let namespace = d.namespace().context("deployment has no namespace")?;
    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let parent_name = d.name_any();
    let parent_ref = d.spec.deployment_package_ref.clone();

    for child_name in children.keys() {
        let Some(mut child) = api.get_opt(child_name).await? else {
            bail!("child deployment {namespace}/{child_name} not found");
        };

        let helper = PatchHelper::new(&child)?;
        let status = child.status.get_or_insert_with(DeploymentStatus::default);
        let parents = status
            .parent_deployment_list
            .get_or_insert_with(BTreeMap::new);
        if parents.get(&parent_name) == Some(&parent_ref) {
            continue;
        }

        debug!(child = %child_name, parent = %parent_name, "Recording parent on child deployment");
        parents.insert(parent_name.clone(), parent_ref.clone());
        helper.patch(&api, &child, PatchOptions::default()).await?;
    }
    Ok(())
}

/// Remove this deployment's parent entry from every declared child, then
/// release the dependency finalizer. Children that no longer exist are
/// skipped.
pub async fn handle_dependency_finalizer(ctx: &Context, d: &mut Deployment) -> Result<()> {
    if !contains_finalizer(&d.metadata, FINALIZER_DEPENDENCY) {
        return Ok(());
    }

    if let Some(children) = d.spec.child_deployment_list.clone() {
        let namespace = d.namespace().context("deployment has no namespace")?;
        let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
        let parent_name = d.name_any();

        for child_name in children.keys() {
            let Some(mut child) = api.get_opt(child_name).await? else {
                debug!(child = %child_name, "Child deployment already gone, skipping");
                continue;
            };

            let helper = PatchHelper::new(&child)?;
            let removed = child
                .status
                .as_mut()
                .and_then(|s| s.parent_deployment_list.as_mut())
                .is_some_and(|parents| parents.remove(&parent_name).is_some());
            if removed {
                info!(child = %child_name, parent = %parent_name, "Released parent entry on child deployment");
                helper.patch(&api, &child, PatchOptions::default()).await?;
            }
        }
    }

    remove_finalizer(&mut d.metadata, FINALIZER_DEPENDENCY);
    Ok(())
}
