// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Every controller receives an `Arc<Context>` holding:
//! - the Kubernetes client
//! - the env-derived [`Config`]
//! - an HTTP client for Gitea / secret-service / catalog calls
//! - the git CA-cert cache, refreshed by a background watcher task
//! - the deployment-metadata cache feeding metric cleanup on deletion
//!
//! The caches are process-wide singletons in behavior but are passed as
//! explicit handles so tests can construct isolated instances.

use chrono::{DateTime, Utc};
use kube::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::METADATA_CACHE_TTL_SECS;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Operator configuration (env-derived, immutable)
    pub config: Config,

    /// HTTP client for Gitea REST, secret-service and catalog calls
    pub http_client: reqwest::Client,

    /// Git server CA bundle, refreshed from disk by the watcher task
    pub ca_certs: CaCertCache,

    /// Deployment metadata retained for metric cleanup after deletion
    pub metadata_cache: MetadataCache,
}

impl Context {
    /// Build a context from a client and configuration.
    #[must_use]
    pub fn new(client: Client, config: Config) -> Self {
        Context {
            client,
            config,
            http_client: reqwest::Client::new(),
            ca_certs: CaCertCache::default(),
            metadata_cache: MetadataCache::default(),
        }
    }
}

/// Process-wide cache of the git server's PEM CA bundle.
///
/// Reads take a read lock; the watcher task takes the write lock only when
/// the file content actually changed.
#[derive(Clone, Default)]
pub struct CaCertCache {
    inner: Arc<RwLock<Option<Vec<u8>>>>,
}

impl CaCertCache {
    /// Current CA bundle, if one has been loaded.
    pub async fn get(&self) -> Option<Vec<u8>> {
        self.inner.read().await.clone()
    }

    /// Replace the cached bundle.
    pub async fn set(&self, pem: Option<Vec<u8>>) {
        *self.inner.write().await = pem;
    }

    /// Load the bundle from disk once; absent file clears the cache.
    pub async fn load_from(&self, path: &PathBuf) -> bool {
        match tokio::fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => {
                let changed = self.inner.read().await.as_deref() != Some(bytes.as_slice());
                if changed {
                    self.set(Some(bytes)).await;
                }
                changed
            }
            Ok(_) | Err(_) => {
                let changed = self.inner.read().await.is_some();
                if changed {
                    self.set(None).await;
                }
                changed
            }
        }
    }
}

/// Background task keeping a [`CaCertCache`] in sync with the mounted cert
/// file. Certificate rotation lands as a file replacement, so polling the
/// content is sufficient.
pub async fn watch_ca_cert_file(cache: CaCertCache, folder: String, file: String) {
    let path = PathBuf::from(&folder).join(&file);
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        if cache.load_from(&path).await {
            debug!(path = %path.display(), "Reloaded git CA certificate");
        }
    }
}

/// Metadata retained about a deployment for cleanup after its CR is gone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentMeta {
    /// The deployment id
    pub deployment_id: String,

    /// The owning project id
    pub project_id: String,

    /// When the deployment was created
    pub created: Option<DateTime<Utc>>,
}

/// Bounded TTL cache of [`DeploymentMeta`], keyed by `namespace/name`.
///
/// Written on every successful reconcile (idempotent) and drained by the
/// deletion path so metric series can be removed after the CR disappeared.
#[derive(Clone, Default)]
pub struct MetadataCache {
    inner: Arc<Mutex<HashMap<String, (DeploymentMeta, Instant)>>>,
}

impl MetadataCache {
    /// Insert or refresh an entry. Idempotent.
    pub async fn cache(&self, key: &str, meta: DeploymentMeta) {
        let mut map = self.inner.lock().await;
        map.insert(key.to_string(), (meta, Instant::now()));
    }

    /// Remove and return an entry, if present.
    pub async fn get_and_remove(&self, key: &str) -> Option<DeploymentMeta> {
        let mut map = self.inner.lock().await;
        map.remove(key).map(|(meta, _)| meta)
    }

    /// Drop entries older than the TTL. Returns how many were dropped.
    pub async fn cleanup_old_entries(&self) -> usize {
        let ttl = Duration::from_secs(METADATA_CACHE_TTL_SECS);
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, (_, stamp)| stamp.elapsed() < ttl);
        let dropped = before - map.len();
        if dropped > 0 {
            warn!("Dropped {dropped} stale deployment metadata cache entries");
        }
        dropped
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Background task sweeping the metadata cache at half-TTL cadence.
pub async fn sweep_metadata_cache(cache: MetadataCache) {
    let mut ticker = tokio::time::interval(Duration::from_secs(METADATA_CACHE_TTL_SECS / 2));
    loop {
        ticker.tick().await;
        cache.cleanup_old_entries().await;
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
