// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation controllers for deployment resources.
//!
//! This module contains the reconciliation logic for the Admiral Custom
//! Resources and the CD engine resources they are derived from.
//!
//! # Reconciliation Architecture
//!
//! Admiral follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Monitor resource changes via Kubernetes API
//! 2. **Reconcile** - Compare desired state (CRD spec) with actual state
//! 3. **Update** - Converge git repositories and `GitRepo` bindings
//! 4. **Status** - Report aggregate state back to Kubernetes
//!
//! # Available Reconcilers
//!
//! - [`reconcile_deployment`] - Converges a `Deployment` into a per-app git
//!   repository plus `GitRepo` bindings, then aggregates cluster status
//! - [`reconcile_deployment_cluster`] - Rebuilds one per-cluster status row
//!   from the `BundleDeployment`s on that cluster
//! - [`create_for_bundle_deployment`] - Creates the status row when the CD
//!   engine materializes a new `BundleDeployment`
//! - [`reconcile_cluster`] - Mirrors a fleet cluster registration into the
//!   internal `Cluster` resource and tracks agent liveness

pub mod cluster;
pub mod deployment;
pub mod deploymentcluster;
pub mod finalizers;
pub mod status;

pub use cluster::reconcile_cluster;
pub use deployment::reconcile_deployment;
pub use deploymentcluster::{
    create_for_bundle_deployment, deployment_cluster_name, reconcile_deployment_cluster,
};
