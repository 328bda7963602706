// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

use admiral::{
    config::Config,
    constants::{ERROR_REQUEUE_DURATION_SECS, METRICS_SERVER_PORT, TOKIO_WORKER_THREADS},
    context::{sweep_metadata_cache, watch_ca_cert_file, Context},
    crd::{Cluster, Deployment, DeploymentCluster},
    fleet::{self, BundleDeployment, GitRepo},
    metrics::gather_metrics,
    reconcilers::{
        create_for_bundle_deployment, reconcile_cluster, reconcile_deployment,
        reconcile_deployment_cluster,
    },
};
use anyhow::Result;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher, Controller, WatchStreamExt},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("admiral-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Initialize logging with custom format
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Example: RUST_LOG=debug cargo run
    //
    // Respects RUST_LOG_FORMAT environment variable for output format
    // Example: RUST_LOG_FORMAT=json cargo run
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting Admiral deployment controller");

    let config = Config::from_env()?;

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let ctx = Arc::new(Context::new(client.clone(), config.clone()));

    // Background tasks: CA-cert file watcher and metadata-cache sweeper
    tokio::spawn(watch_ca_cert_file(
        ctx.ca_certs.clone(),
        config.git_ca_cert_folder.clone(),
        config.git_ca_cert_file.clone(),
    ));
    tokio::spawn(sweep_metadata_cache(ctx.metadata_cache.clone()));

    info!("Starting all controllers");

    // Controllers should never exit - if one does, log it and exit the process
    tokio::select! {
        result = run_deployment_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: Deployment controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Deployment controller exited unexpectedly without error")
        }
        result = run_deploymentcluster_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: DeploymentCluster controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("DeploymentCluster controller exited unexpectedly without error")
        }
        result = run_cluster_controller(client.clone(), ctx.clone()) => {
            error!("CRITICAL: Cluster controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Cluster controller exited unexpectedly without error")
        }
        result = run_bundle_deployment_watcher(client.clone(), ctx.clone()) => {
            error!("CRITICAL: BundleDeployment watcher exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("BundleDeployment watcher exited unexpectedly without error")
        }
        result = run_metrics_server() => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
    }
}

/// Run the `Deployment` controller.
///
/// Owns the `GitRepo` bindings and additionally watches `DeploymentCluster`
/// rows so status changes on a target cluster retrigger the owning
/// deployment's aggregation.
async fn run_deployment_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting Deployment controller");

    let api = Api::<Deployment>::all(client.clone());
    let git_repos = Api::<GitRepo>::all(client.clone());
    let rows = Api::<DeploymentCluster>::all(client);

    let controller = Controller::new(api, watcher::Config::default());
    let store = controller.store();

    controller
        .owns(git_repos, watcher::Config::default())
        .watches(rows, watcher::Config::default(), move |row| {
            // Deployment ids are globally unique resource names; resolve the
            // owning deployment's namespace through the reflector store.
            let deployment_id = row.spec.deployment_id.clone();
            store
                .state()
                .into_iter()
                .filter(move |d| d.name_any() == deployment_id)
                .map(|d| ObjectRef::from_obj(d.as_ref()))
        })
        .run(reconcile_deployment_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `Deployment`
async fn reconcile_deployment_wrapper(
    deployment: Arc<Deployment>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(
        deployment = %deployment.name_any(),
        namespace = ?deployment.namespace(),
        "Reconcile wrapper called for Deployment"
    );

    let started = std::time::Instant::now();
    match reconcile_deployment(ctx, (*deployment).clone()).await {
        Ok(action) => {
            info!(
                "Successfully reconciled Deployment: {}",
                deployment.name_any()
            );
            admiral::metrics::record_reconciliation_success("Deployment", started.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile Deployment: {}", e);
            admiral::metrics::record_reconciliation_error("Deployment", started.elapsed());
            Err(e.into())
        }
    }
}

/// Run the `DeploymentCluster` controller.
///
/// The rows have no spec to converge; they re-project bundle deployment and
/// cluster state. Both inputs are watched so changes retrigger the row.
async fn run_deploymentcluster_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting DeploymentCluster controller");

    let api = Api::<DeploymentCluster>::all(client.clone());
    let bundle_deployments = Api::<BundleDeployment>::all(client.clone());
    let clusters = Api::<Cluster>::all(client);

    let controller = Controller::new(api, watcher::Config::default());
    let store = controller.store();

    controller
        .watches(
            bundle_deployments,
            watcher::Config::default(),
            bundle_deployment_to_row,
        )
        .watches(clusters, watcher::Config::default(), move |cluster| {
            // A cluster liveness flip invalidates every row on that cluster.
            let cluster_id = cluster.spec.name.clone().unwrap_or_default();
            store
                .state()
                .into_iter()
                .filter(move |row| row.spec.cluster_id == cluster_id)
                .map(|row| ObjectRef::from_obj(row.as_ref()))
        })
        .run(reconcile_deploymentcluster_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Map a changed `BundleDeployment` to the status row aggregating it.
fn bundle_deployment_to_row(bd: BundleDeployment) -> Option<ObjectRef<DeploymentCluster>> {
    let labels = bd.labels();
    let deployment_id = labels.get(admiral::labels::LABEL_DEPLOYMENT_ID)?;
    let cluster_id = labels.get(admiral::labels::LABEL_FLEET_CLUSTER)?;
    let namespace = labels.get(admiral::labels::LABEL_FLEET_CLUSTER_NAMESPACE)?;
    match admiral::reconcilers::deployment_cluster_name(deployment_id, cluster_id) {
        Ok(name) => Some(ObjectRef::new(&name).within(namespace)),
        Err(e) => {
            warn!(bundle_deployment = %bd.name_any(), "Cannot derive row name: {e:#}");
            None
        }
    }
}

/// Reconcile wrapper for `DeploymentCluster`
async fn reconcile_deploymentcluster_wrapper(
    row: Arc<DeploymentCluster>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = std::time::Instant::now();
    match reconcile_deployment_cluster(ctx, (*row).clone()).await {
        Ok(action) => {
            debug!(
                "Successfully reconciled DeploymentCluster: {}",
                row.name_any()
            );
            admiral::metrics::record_reconciliation_success("DeploymentCluster", started.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile DeploymentCluster: {}", e);
            admiral::metrics::record_reconciliation_error("DeploymentCluster", started.elapsed());
            Err(e.into())
        }
    }
}

/// Run the `Cluster` controller.
///
/// The fleet cluster record is the primary: it exists before the internal
/// mirror does, and the reconciler creates the mirror on first sight. The
/// mirror is owned so its deletion retriggers re-creation.
async fn run_cluster_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting Cluster controller");

    let api = Api::<fleet::Cluster>::all(client.clone());
    let mirrors = Api::<Cluster>::all(client);

    Controller::new(api, watcher::Config::default())
        .owns(mirrors, watcher::Config::default())
        .run(reconcile_cluster_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for the fleet `Cluster`
async fn reconcile_cluster_wrapper(
    fleet_cluster: Arc<fleet::Cluster>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let started = std::time::Instant::now();
    match reconcile_cluster(ctx, (*fleet_cluster).clone()).await {
        Ok(action) => {
            debug!(
                "Successfully reconciled Cluster: {}",
                fleet_cluster.name_any()
            );
            admiral::metrics::record_reconciliation_success("Cluster", started.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to reconcile Cluster: {}", e);
            admiral::metrics::record_reconciliation_error("Cluster", started.elapsed());
            Err(e.into())
        }
    }
}

/// Watch `BundleDeployment`s and create the status row for each new app
/// bundle. Rows cannot be reconciled into existence by their own controller,
/// so creation happens here and the row controller takes over from there.
async fn run_bundle_deployment_watcher(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting BundleDeployment watcher");

    let api = Api::<BundleDeployment>::all(client);
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).touched_objects());

    while let Some(event) = stream.next().await {
        match event {
            Ok(bd) => {
                if bd.metadata.deletion_timestamp.is_some() {
                    continue;
                }
                if let Err(e) = create_for_bundle_deployment(ctx.clone(), bd).await {
                    warn!("Failed to create deployment cluster row: {e:#}");
                }
            }
            Err(e) => {
                warn!("BundleDeployment watch error: {e}");
            }
        }
    }

    Ok(())
}

/// Serve the Prometheus registry on `/metrics`.
async fn run_metrics_server() -> Result<()> {
    let app = axum::Router::new().route("/metrics", axum::routing::get(metrics_handler));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], METRICS_SERVER_PORT));
    info!("Serving metrics on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> Result<String, (axum::http::StatusCode, String)> {
    gather_metrics().map_err(|e| {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to gather metrics: {e}"),
        )
    })
}

/// Error policy for all controllers
fn error_policy(
    _resource: Arc<impl std::fmt::Debug>,
    _err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}
