// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Environment-derived operator configuration.
//!
//! All knobs arrive via environment variables (see the deployment chart).
//! [`Config::from_env`] is called once at startup; missing required variables
//! fail startup with a descriptive error rather than surfacing later inside a
//! reconcile.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::constants::{DEFAULT_FLEET_AGENT_CHECKIN_MINUTES, DEFAULT_GIT_POLLING_INTERVAL};

/// Transport used for the per-deployment git remotes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GitRemoteType {
    Http,
    Https,
    Ssh,
}

impl GitRemoteType {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "http" => Ok(GitRemoteType::Http),
            "https" => Ok(GitRemoteType::Https),
            "ssh" => Ok(GitRemoteType::Ssh),
            other => bail!("FLEET_GIT_REMOTE_TYPE must be http, https or ssh, got '{other}'"),
        }
    }

    /// URL scheme for http(s) transports.
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            GitRemoteType::Http => "http",
            GitRemoteType::Https | GitRemoteType::Ssh => "https",
        }
    }
}

/// Operator configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Git server host (no scheme), e.g. "gitea.example.org"
    pub git_server: String,

    /// Git user owning the per-deployment repositories
    pub git_user: String,

    /// Git password; empty when the secret service is the credential source
    pub git_password: String,

    /// Git provider; only "gitea" is supported
    pub git_provider: String,

    /// Optional proxy URL for git transport
    pub git_proxy: Option<String>,

    /// Optional base64-encoded PEM CA bundle for the git server
    pub git_ca_cert: Option<String>,

    /// Transport for remote URLs
    pub git_remote_type: GitRemoteType,

    /// Poll interval handed to generated GitRepo bindings (duration string)
    pub fleet_git_polling_interval: String,

    /// Fleet agent checkin interval; a cluster is Unknown past this
    pub fleet_agent_checkin: Duration,

    /// Whether git credentials come from the secret service
    pub secret_service_enabled: bool,

    /// Vault-style secret service endpoint
    pub secret_service_endpoint: Option<String>,

    /// Service account used for secret-service kubernetes auth
    pub service_account: Option<String>,

    /// Keycloak endpoint for catalog M2M tokens
    pub keycloak_service_endpoint: Option<String>,

    /// Catalog service endpoint for isDeployed bookkeeping
    pub catalog_service_endpoint: Option<String>,

    /// Whether remote repositories are deleted on deployment teardown
    pub delete_repo_on_terminate: bool,

    /// Whether fleet-globals.yaml carries the cluster-label pass-throughs
    pub fleet_add_global_vars: bool,

    /// Optional helm secret name injected into GitRepo bindings
    pub api_agent_helm_secret_name: Option<String>,

    /// Folder holding the git CA cert file watched at runtime
    pub git_ca_cert_folder: String,

    /// File name of the git CA cert within the folder
    pub git_ca_cert_file: String,

    /// API client QPS ceiling (informational; enforced by the client layer)
    pub rate_limiter_qps: Option<u32>,

    /// API client burst ceiling
    pub rate_limiter_burst: Option<u32>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env_opt(key).map_or(default, |v| v.eq_ignore_ascii_case("true"))
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env_opt(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid integer '{raw}' for {key}, falling back to default {default}"
            );
            default
        }),
        None => default,
    }
}

impl Config {
    /// Build the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or malformed.
    pub fn from_env() -> Result<Self> {
        let git_server = env_opt("GIT_SERVER").context("GIT_SERVER is required")?;
        let git_user = env_opt("GIT_USER").context("GIT_USER is required")?;
        let git_remote_type = GitRemoteType::parse(
            &env_opt("FLEET_GIT_REMOTE_TYPE").context("FLEET_GIT_REMOTE_TYPE is required")?,
        )?;

        let secret_service_enabled = env_bool("SECRET_SERVICE_ENABLED", false);
        let git_password = match env_opt("GIT_PASSWORD") {
            Some(pw) => pw,
            None if secret_service_enabled => String::new(),
            None => bail!("GIT_PASSWORD is required when SECRET_SERVICE_ENABLED is not set"),
        };

        let checkin_minutes = env_u64(
            "FLEET_AGENT_CHECKIN",
            DEFAULT_FLEET_AGENT_CHECKIN_MINUTES,
        );

        Ok(Config {
            git_server,
            git_user,
            git_password,
            git_provider: env_opt("GIT_PROVIDER").unwrap_or_else(|| "gitea".to_string()),
            git_proxy: env_opt("GIT_PROXY"),
            git_ca_cert: env_opt("GIT_CA_CERT"),
            git_remote_type,
            fleet_git_polling_interval: env_opt("FLEET_GIT_POLLING_INTERVAL")
                .unwrap_or_else(|| DEFAULT_GIT_POLLING_INTERVAL.to_string()),
            fleet_agent_checkin: Duration::from_secs(checkin_minutes * 60),
            secret_service_enabled,
            secret_service_endpoint: env_opt("SECRET_SERVICE_ENDPOINT"),
            service_account: env_opt("SERVICE_ACCOUNT"),
            keycloak_service_endpoint: env_opt("KEYCLOAK_SERVICE_ENDPOINT"),
            catalog_service_endpoint: env_opt("CATALOG_SERVICE_ENDPOINT"),
            delete_repo_on_terminate: env_bool("GITEA_DELETE_REPO_ON_TERMINATE", true),
            fleet_add_global_vars: env_bool("FLEET_ADD_GLOBAL_VARS", false),
            api_agent_helm_secret_name: env_opt("API_AGENT_HELM_SECRET_NAME"),
            git_ca_cert_folder: env_opt("GIT_CA_CERT_FOLDER")
                .unwrap_or_else(|| "/etc/ssl/certs/".to_string()),
            git_ca_cert_file: env_opt("GIT_CA_CERT_FILE").unwrap_or_else(|| "ca.crt".to_string()),
            rate_limiter_qps: env_opt("RATE_LIMITER_QPS").and_then(|v| v.parse().ok()),
            rate_limiter_burst: env_opt("RATE_LIMITER_BURST").and_then(|v| v.parse().ok()),
        })
    }

    /// A configuration suitable for unit tests: local git server, env creds.
    #[cfg(test)]
    #[must_use]
    pub fn for_tests() -> Self {
        Config {
            git_server: "gitea.test.local".to_string(),
            git_user: "adm".to_string(),
            git_password: "secret".to_string(),
            git_provider: "gitea".to_string(),
            git_proxy: None,
            git_ca_cert: None,
            git_remote_type: GitRemoteType::Https,
            fleet_git_polling_interval: DEFAULT_GIT_POLLING_INTERVAL.to_string(),
            fleet_agent_checkin: Duration::from_secs(DEFAULT_FLEET_AGENT_CHECKIN_MINUTES * 60),
            secret_service_enabled: false,
            secret_service_endpoint: None,
            service_account: None,
            keycloak_service_endpoint: None,
            catalog_service_endpoint: None,
            delete_repo_on_terminate: true,
            fleet_add_global_vars: false,
            api_agent_helm_secret_name: None,
            git_ca_cert_folder: "/etc/ssl/certs/".to_string(),
            git_ca_cert_file: "ca.crt".to_string(),
            rate_limiter_qps: None,
            rate_limiter_burst: None,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
