// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Unit tests for catalog.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_keycloak(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/realms/master/protocol/openid-connect/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "m2m-token"})),
            )
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer) -> CatalogClient {
        let mut config = Config::for_tests();
        config.catalog_service_endpoint = Some(server.uri());
        config.keycloak_service_endpoint = Some(server.uri());
        config.service_account = Some("orch-svc".to_string());
        CatalogClient::from_config(&config, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn test_from_config_disabled_without_endpoints() {
        let config = Config::for_tests();
        assert!(CatalogClient::from_config(&config, reqwest::Client::new()).is_none());
    }

    #[tokio::test]
    async fn test_update_is_deployed_writes_when_flag_differs() {
        let server = MockServer::start().await;
        mock_keycloak(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/deployment_packages/wordpress/versions/0.1.0"))
            .and(header("ActiveProjectID", "project-a"))
            .and(header("Authorization", "Bearer m2m-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"deploymentPackage": {"name": "wordpress", "isDeployed": true}}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/v3/deployment_packages/wordpress/versions/0.1.0"))
            .and(header("ActiveProjectID", "project-a"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .update_is_deployed("project-a", "wordpress", "0.1.0", false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_is_deployed_skips_write_when_flag_matches() {
        let server = MockServer::start().await;
        mock_keycloak(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/deployment_packages/wordpress/versions/0.1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"deploymentPackage": {"name": "wordpress", "isDeployed": true}}),
            ))
            .mount(&server)
            .await;

        // no PUT mock mounted: a write attempt would 404 and fail the call
        let client = client_for(&server);
        client
            .update_is_deployed("project-a", "wordpress", "0.1.0", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_is_deployed_not_found() {
        let server = MockServer::start().await;
        mock_keycloak(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/deployment_packages/gone/versions/9.9.9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .update_is_deployed("project-a", "gone", "9.9.9", false)
            .await;
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_is_deployed_auth_rejected() {
        let server = MockServer::start().await;
        mock_keycloak(&server).await;

        Mock::given(method("GET"))
            .and(path("/v3/deployment_packages/wordpress/versions/0.1.0"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .update_is_deployed("project-a", "wordpress", "0.1.0", false)
            .await;
        assert!(matches!(result, Err(CatalogError::Auth(_))));
    }

    #[tokio::test]
    async fn test_keycloak_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/realms/master/protocol/openid-connect/token"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .update_is_deployed("project-a", "wordpress", "0.1.0", false)
            .await;
        assert!(matches!(result, Err(CatalogError::Auth(_))));
    }
}
