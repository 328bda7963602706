// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Unit tests for git/credentials.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_token_file(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("token");
        std::fs::write(&path, "jwt-token\n").unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_env_credentials_pass_through() {
        let mut config = Config::for_tests();
        config.git_user = "gitops".to_string();
        config.git_password = "hunter2".to_string();

        let source = EnvCredentials::new(&config).unwrap();
        let creds = source.git_credentials().await.unwrap();
        assert_eq!(creds.username, "gitops");
        assert_eq!(creds.password, "hunter2");
        assert!(creds.ca_cert.is_none());
    }

    #[tokio::test]
    async fn test_env_credentials_decode_ca_cert() {
        use base64::Engine;
        let pem = "-----BEGIN CERTIFICATE-----\nabc\n-----END CERTIFICATE-----\n";
        let mut config = Config::for_tests();
        config.git_ca_cert = Some(base64::engine::general_purpose::STANDARD.encode(pem));

        let source = EnvCredentials::new(&config).unwrap();
        let creds = source.git_credentials().await.unwrap();
        assert_eq!(creds.ca_cert.as_deref(), Some(pem.as_bytes()));
    }

    #[test]
    fn test_env_credentials_reject_bad_base64() {
        let mut config = Config::for_tests();
        config.git_ca_cert = Some("not base64 !!!".to_string());
        assert!(EnvCredentials::new(&config).is_err());
    }

    #[test]
    fn test_credential_source_selects_env_by_default() {
        let config = Config::for_tests();
        assert!(credential_source(&config, reqwest::Client::new()).is_ok());
    }

    #[test]
    fn test_secret_service_requires_endpoint() {
        let mut config = Config::for_tests();
        config.secret_service_enabled = true;
        config.service_account = Some("orch-svc".to_string());
        assert!(credential_source(&config, reqwest::Client::new()).is_err());
    }

    #[tokio::test]
    async fn test_secret_service_login_read_logout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/kubernetes/login"))
            .and(body_json(json!({"role": "orch-svc", "jwt": "jwt-token"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"auth": {"client_token": "s.token"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/git_service"))
            .and(header("X-Vault-Token", "s.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"data": {"data": {"username": "gitops", "password": "hunter2"}}}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/harbor_service"))
            .and(header("X-Vault-Token", "s.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"data": {"data": {"cacerts": "-----BEGIN CERTIFICATE-----"}}}),
            ))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/token/revoke-self"))
            .and(header("X-Vault-Token", "s.token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let token_path = write_token_file(&dir);

        let mut config = Config::for_tests();
        config.secret_service_enabled = true;
        config.secret_service_endpoint = Some(server.uri());
        config.service_account = Some("orch-svc".to_string());

        let source = SecretServiceCredentials::new(&config, reqwest::Client::new())
            .unwrap()
            .with_token_path(&token_path);

        let creds = source.git_credentials().await.unwrap();
        assert_eq!(creds.username, "gitops");
        assert_eq!(creds.password, "hunter2");
        assert_eq!(
            creds.ca_cert.as_deref(),
            Some("-----BEGIN CERTIFICATE-----".as_bytes())
        );
    }

    #[tokio::test]
    async fn test_secret_service_missing_harbor_secret_is_not_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/kubernetes/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"auth": {"client_token": "s.token"}})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/git_service"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"data": {"data": {"username": "gitops", "password": "hunter2"}}}),
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/secret/data/harbor_service"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/token/revoke-self"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let token_path = write_token_file(&dir);

        let mut config = Config::for_tests();
        config.secret_service_enabled = true;
        config.secret_service_endpoint = Some(server.uri());
        config.service_account = Some("orch-svc".to_string());

        let source = SecretServiceCredentials::new(&config, reqwest::Client::new())
            .unwrap()
            .with_token_path(&token_path);

        let creds = source.git_credentials().await.unwrap();
        assert_eq!(creds.username, "gitops");
        assert!(creds.ca_cert.is_none());
    }

    #[tokio::test]
    async fn test_secret_service_login_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/kubernetes/login"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let token_path = write_token_file(&dir);

        let mut config = Config::for_tests();
        config.secret_service_enabled = true;
        config.secret_service_endpoint = Some(server.uri());
        config.service_account = Some("orch-svc".to_string());

        let source = SecretServiceCredentials::new(&config, reqwest::Client::new())
            .unwrap()
            .with_token_path(&token_path);

        assert!(source.git_credentials().await.is_err());
    }
}
