// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Admiral - Application Deployment Operator for Edge Kubernetes
//!
//! Admiral is a Kubernetes operator written in Rust that turns declarative
//! application deployments into GitOps bundles delivered to fleets of edge
//! clusters by a CD engine (fleet.cattle.io).
//!
//! ## Overview
//!
//! This library provides the core functionality for the Admiral operator,
//! including:
//!
//! - Custom Resource Definitions (CRDs) for deployments, per-cluster status
//!   rows and cluster liveness mirrors
//! - Reconciliation logic converging each deployment into a per-deployment
//!   Git repository plus `GitRepo` bindings
//! - Fleet bundle configuration generation (fleet.yaml, values, targets)
//! - Status aggregation across target clusters
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types owned by the operator
//! - [`fleet`] - External CD-engine resource types (read/write surface only)
//! - [`reconcilers`] - Reconciliation logic for each resource type
//! - [`bundle`] - Fleet bundle configuration generation
//! - [`git`] - Gitea-backed repository client
//! - [`catalog`] - Catalog service bookkeeping client
//! - [`context`] - Shared context, CA-cert cache and metadata cache
//! - [`patch`] - Snapshot/diff patch helper issuing minimal merge patches
//! - [`config`] - Environment-derived operator configuration
//! - [`metrics`] - Prometheus metrics registry and recorders
//!
//! ## Example
//!
//! ```rust,no_run
//! use admiral::crd::{DeploymentPackageRef, DeploymentSpec, DeploymentType};
//!
//! // Create a deployment specification
//! let spec = DeploymentSpec {
//!     display_name: "wordpress".to_string(),
//!     project: "acme".to_string(),
//!     deployment_package_ref: DeploymentPackageRef {
//!         name: "wordpress".to_string(),
//!         version: "0.1.0".to_string(),
//!         profile_name: Some("default".to_string()),
//!         forbids_multiple_deployments: None,
//!         namespaces: None,
//!     },
//!     applications: Vec::new(),
//!     deployment_type: DeploymentType::AutoScaling,
//!     child_deployment_list: None,
//!     network_ref: None,
//! };
//! ```

pub mod bundle;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod fleet;
pub mod git;
pub mod labels;
pub mod metrics;
pub mod patch;
pub mod reconcilers;
