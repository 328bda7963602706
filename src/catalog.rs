// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Catalog service client.
//!
//! The catalog tracks which deployment packages are in use. Admiral only
//! flips the `isDeployed` flag: set on first deployment, cleared by the
//! catalog finalizer when the last deployment of a package is torn down.
//!
//! Requests are project-scoped via the `ActiveProjectID` header and carry a
//! machine-to-machine bearer token from keycloak.

use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;

/// Catalog failure taxonomy. `NotFound` means there is nothing to update,
/// which deletion paths treat as success.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The deployment package does not exist in the catalog
    #[error("deployment package {0} not found in catalog")]
    NotFound(String),

    /// Token acquisition or a 401/403 from the catalog
    #[error("catalog authentication failed: {0}")]
    Auth(String),

    /// Transport or unexpected-status failure
    #[error("catalog request failed: {0}")]
    Request(String),
}

/// REST client for the catalog service.
#[derive(Clone)]
pub struct CatalogClient {
    catalog_endpoint: String,
    keycloak_endpoint: String,
    client_id: String,
    http: reqwest::Client,
}

impl CatalogClient {
    /// Build a client when both endpoints are configured; `None` disables
    /// catalog bookkeeping entirely.
    #[must_use]
    pub fn from_config(config: &Config, http: reqwest::Client) -> Option<Self> {
        let catalog_endpoint = config.catalog_service_endpoint.clone()?;
        let keycloak_endpoint = config.keycloak_service_endpoint.clone()?;
        Some(CatalogClient {
            catalog_endpoint: catalog_endpoint.trim_end_matches('/').to_string(),
            keycloak_endpoint: keycloak_endpoint.trim_end_matches('/').to_string(),
            client_id: config
                .service_account
                .clone()
                .unwrap_or_else(|| "system-client".to_string()),
            http,
        })
    }

    /// Fetch a machine-to-machine token from keycloak.
    async fn m2m_token(&self) -> Result<String, CatalogError> {
        let url = format!(
            "{}/realms/master/protocol/openid-connect/token",
            self.keycloak_endpoint
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
        ];
        let resp = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CatalogError::Auth(format!("keycloak unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(CatalogError::Auth(format!(
                "keycloak returned {}",
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| CatalogError::Auth(format!("malformed token response: {e}")))?;
        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| CatalogError::Auth("token response missing access_token".to_string()))
    }

    fn package_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/v3/deployment_packages/{name}/versions/{version}",
            self.catalog_endpoint
        )
    }

    /// Set or clear the `isDeployed` flag of a deployment package.
    ///
    /// Reads the package first and skips the write when the flag already has
    /// the requested value.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when the package is gone,
    /// [`CatalogError::Auth`] on token or authorization failures.
    pub async fn update_is_deployed(
        &self,
        project_id: &str,
        name: &str,
        version: &str,
        is_deployed: bool,
    ) -> Result<(), CatalogError> {
        let token = self.m2m_token().await?;
        let url = self.package_url(name, version);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .header("ActiveProjectID", project_id)
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        let mut package = match resp.status().as_u16() {
            404 => return Err(CatalogError::NotFound(format!("{name}/{version}"))),
            401 | 403 => {
                return Err(CatalogError::Auth(format!(
                    "catalog rejected read of {name}/{version}"
                )))
            }
            s if (200..300).contains(&s) => {
                let body: Value = resp
                    .json()
                    .await
                    .map_err(|e| CatalogError::Request(e.to_string()))?;
                body.get("deploymentPackage")
                    .cloned()
                    .ok_or_else(|| {
                        CatalogError::Request("response missing deploymentPackage".to_string())
                    })?
            }
            s => {
                return Err(CatalogError::Request(format!(
                    "catalog returned {s} for {name}/{version}"
                )))
            }
        };

        let current = package
            .get("isDeployed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if current == is_deployed {
            debug!(package = %name, version, is_deployed, "Catalog flag already correct");
            return Ok(());
        }

        if let Some(map) = package.as_object_mut() {
            map.insert("isDeployed".to_string(), Value::Bool(is_deployed));
        }

        let resp = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .header("ActiveProjectID", project_id)
            .json(&serde_json::json!({ "deploymentPackage": package }))
            .send()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;

        match resp.status().as_u16() {
            404 => Err(CatalogError::NotFound(format!("{name}/{version}"))),
            401 | 403 => Err(CatalogError::Auth(format!(
                "catalog rejected update of {name}/{version}"
            ))),
            s if (200..300).contains(&s) => {
                info!(package = %name, version, is_deployed, "Updated catalog deployment flag");
                Ok(())
            }
            s => Err(CatalogError::Request(format!(
                "catalog returned {s} updating {name}/{version}"
            ))),
        }
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod catalog_tests;
