// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Git credential resolution.
//!
//! Credentials come from the platform secret service (Vault-style KV v2,
//! kubernetes-auth login) when `SECRET_SERVICE_ENABLED` is set, otherwise
//! from the environment. The secret service additionally carries the git
//! server CA bundle under the harbor service secret.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;

/// Path of the mounted service-account token used for kubernetes auth.
const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// KV v2 path of the git service credentials.
const GIT_SERVICE_SECRET_PATH: &str = "secret/data/git_service";

/// KV v2 path of the harbor service secret carrying the CA bundle.
const HARBOR_SERVICE_SECRET_PATH: &str = "secret/data/harbor_service";

/// Resolved git credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitCredentials {
    pub username: String,
    pub password: String,

    /// PEM CA bundle for the git server, when the credential source carries one
    pub ca_cert: Option<Vec<u8>>,
}

/// Source of git credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Resolve the credentials for the configured git server.
    async fn git_credentials(&self) -> Result<GitCredentials>;
}

/// Credentials taken directly from the environment-derived [`Config`].
pub struct EnvCredentials {
    username: String,
    password: String,
    ca_cert: Option<Vec<u8>>,
}

impl EnvCredentials {
    /// Build from configuration; decodes the optional base64 `GIT_CA_CERT`.
    ///
    /// # Errors
    ///
    /// Returns an error when `GIT_CA_CERT` is set but not valid base64.
    pub fn new(config: &Config) -> Result<Self> {
        use base64::Engine;
        let ca_cert = config
            .git_ca_cert
            .as_deref()
            .map(|b64| {
                base64::engine::general_purpose::STANDARD
                    .decode(b64)
                    .context("GIT_CA_CERT is not valid base64")
            })
            .transpose()?;

        Ok(EnvCredentials {
            username: config.git_user.clone(),
            password: config.git_password.clone(),
            ca_cert,
        })
    }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn git_credentials(&self) -> Result<GitCredentials> {
        Ok(GitCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
            ca_cert: self.ca_cert.clone(),
        })
    }
}

/// Vault-style KV v2 secret service client.
///
/// Performs kubernetes-auth login, reads the git service secret (and the CA
/// bundle from the harbor service secret), then revokes its own token.
pub struct SecretServiceCredentials {
    endpoint: String,
    role: String,
    http: reqwest::Client,
    token_path: String,
}

impl SecretServiceCredentials {
    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint or service account is missing.
    pub fn new(config: &Config, http: reqwest::Client) -> Result<Self> {
        let endpoint = config
            .secret_service_endpoint
            .clone()
            .ok_or_else(|| anyhow!("SECRET_SERVICE_ENDPOINT is required"))?;
        let role = config
            .service_account
            .clone()
            .ok_or_else(|| anyhow!("SERVICE_ACCOUNT is required"))?;
        Ok(SecretServiceCredentials {
            endpoint,
            role,
            http,
            token_path: SERVICE_ACCOUNT_TOKEN_PATH.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_token_path(mut self, path: &str) -> Self {
        self.token_path = path.to_string();
        self
    }

    async fn login(&self) -> Result<String> {
        let jwt = tokio::fs::read_to_string(&self.token_path)
            .await
            .context("failed to read service account token")?;

        let url = format!("{}/v1/auth/kubernetes/login", self.endpoint);
        let resp: Value = self
            .http
            .post(&url)
            .json(&json!({"role": self.role, "jwt": jwt.trim()}))
            .send()
            .await
            .context("secret service login request failed")?
            .error_for_status()
            .context("secret service login rejected")?
            .json()
            .await
            .context("secret service login returned malformed JSON")?;

        resp.pointer("/auth/client_token")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("secret service login response missing client_token"))
    }

    async fn read_kv(&self, token: &str, path: &str) -> Result<Value> {
        let url = format!("{}/v1/{path}", self.endpoint);
        let resp: Value = self
            .http
            .get(&url)
            .header("X-Vault-Token", token)
            .send()
            .await
            .with_context(|| format!("secret service read of {path} failed"))?
            .error_for_status()
            .with_context(|| format!("secret service rejected read of {path}"))?
            .json()
            .await
            .context("secret service returned malformed JSON")?;

        resp.pointer("/data/data")
            .cloned()
            .ok_or_else(|| anyhow!("secret {path} has no data"))
    }

    async fn logout(&self, token: &str) {
        let url = format!("{}/v1/auth/token/revoke-self", self.endpoint);
        if let Err(e) = self
            .http
            .post(&url)
            .header("X-Vault-Token", token)
            .send()
            .await
        {
            warn!("Failed to revoke secret service token: {e}");
        }
    }
}

#[async_trait]
impl CredentialSource for SecretServiceCredentials {
    async fn git_credentials(&self) -> Result<GitCredentials> {
        let token = self.login().await?;

        let result = async {
            let git = self.read_kv(&token, GIT_SERVICE_SECRET_PATH).await?;
            let username = git
                .get("username")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("git service secret missing username"))?
                .to_string();
            let password = git
                .get("password")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("git service secret missing password"))?
                .to_string();

            // CA bundle is optional; a missing harbor secret is not fatal
            let ca_cert = match self.read_kv(&token, HARBOR_SERVICE_SECRET_PATH).await {
                Ok(harbor) => harbor
                    .get("cacerts")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.as_bytes().to_vec()),
                Err(e) => {
                    debug!("No CA bundle from secret service: {e}");
                    None
                }
            };

            Ok(GitCredentials {
                username,
                password,
                ca_cert,
            })
        }
        .await;

        self.logout(&token).await;
        result
    }
}

/// Build the configured credential source: secret service when enabled,
/// environment otherwise.
///
/// # Errors
///
/// Returns an error when the selected source is misconfigured.
pub fn credential_source(
    config: &Config,
    http: reqwest::Client,
) -> Result<Box<dyn CredentialSource>> {
    if config.secret_service_enabled {
        Ok(Box::new(SecretServiceCredentials::new(config, http)?))
    } else {
        Ok(Box::new(EnvCredentials::new(config)?))
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod credentials_tests;
