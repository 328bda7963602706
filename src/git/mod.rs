// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! Per-deployment remote Git repository client.
//!
//! Each deployment owns exactly one remote repository named after its
//! deployment id. This module wraps libgit2 for transport (probe, init,
//! shallow clone, commit, push) and the Gitea REST API for repository
//! deletion.
//!
//! All libgit2 work is synchronous and runs under `spawn_blocking`; the
//! client itself is cheap to clone.

use git2::{
    Cred, Direction, IndexAddOption, ProxyOptions, PushOptions, RemoteCallbacks, Repository,
    Signature,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{Config, GitRemoteType};
use crate::constants::{GIT_COMMIT_AUTHOR_EMAIL, GIT_COMMIT_AUTHOR_NAME, GIT_COMMIT_MESSAGE};
use crate::git::credentials::GitCredentials;
use crate::metrics::record_git_operation;

pub mod credentials;

/// Git failure taxonomy. `Network` failures are retriable; the rest need
/// configuration or user intervention.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Transport-level failure (DNS, TLS, timeouts, 5xx)
    #[error("git network failure: {0}")]
    Network(String),

    /// The remote rejected our credentials
    #[error("git authentication failure: {0}")]
    Auth(String),

    /// The remote repository does not exist
    #[error("git repository not found: {0}")]
    NotFound(String),

    /// The remote refused a non-fast-forward or concurrent change
    #[error("git conflict: {0}")]
    Conflict(String),

    /// Anything else
    #[error("git failure: {0}")]
    Internal(String),
}

impl From<git2::Error> for GitError {
    fn from(e: git2::Error) -> Self {
        classify(&e)
    }
}

fn classify(e: &git2::Error) -> GitError {
    use git2::ErrorClass;
    let msg = e.message().to_string();
    let lowered = msg.to_lowercase();

    if lowered.contains("authentication") || lowered.contains("401") || lowered.contains("403") {
        return GitError::Auth(msg);
    }
    if e.code() == git2::ErrorCode::NotFound
        || lowered.contains("not found")
        || lowered.contains("404")
    {
        return GitError::NotFound(msg);
    }
    if e.code() == git2::ErrorCode::NotFastForward || lowered.contains("non-fast-forward") {
        return GitError::Conflict(msg);
    }
    match e.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl => GitError::Network(msg),
        _ => GitError::Internal(msg),
    }
}

/// Whether a probe failure means "the repository is simply not visible".
///
/// A not-yet-created private repository is indistinguishable from an
/// unauthorized one, so both map to "does not exist" and the caller
/// proceeds to create it.
fn means_absent(e: &git2::Error) -> bool {
    matches!(classify(e), GitError::Auth(_) | GitError::NotFound(_))
}

/// Client for one deployment's remote repository.
#[derive(Clone)]
pub struct GitClient {
    deployment_id: String,
    remote_url: String,
    rest_base: String,
    username: String,
    password: String,
    proxy: Option<String>,
    ca_cert: Option<Vec<u8>>,
    base_dir: PathBuf,
    http: reqwest::Client,
}

/// Base URL of the git server including scheme.
fn server_base(config: &Config) -> String {
    let server = config.git_server.trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("{}://{server}", config.git_remote_type.scheme())
    }
}

/// Host portion of the git server, for ssh remote URLs.
fn server_host(config: &Config) -> String {
    let base = server_base(config);
    url::Url::parse(&base)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_else(|| {
            config
                .git_server
                .trim_start_matches("http://")
                .trim_start_matches("https://")
                .trim_end_matches('/')
                .to_string()
        })
}

impl GitClient {
    /// Build a client for one deployment.
    ///
    /// `credentials` must already be resolved (secret service or env); the
    /// CA bundle from the credential source wins over the cached one.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Internal`] when the configuration is unusable.
    pub fn new(
        config: &Config,
        http: reqwest::Client,
        deployment_id: &str,
        base_dir: PathBuf,
        credentials: GitCredentials,
        cached_ca: Option<Vec<u8>>,
    ) -> Result<Self, GitError> {
        if deployment_id.is_empty() {
            return Err(GitError::Internal("deployment id is empty".to_string()));
        }

        let remote_url = match config.git_remote_type {
            GitRemoteType::Ssh => format!(
                "git@{}:{}/{}.git",
                server_host(config),
                credentials.username,
                deployment_id
            ),
            GitRemoteType::Http | GitRemoteType::Https => format!(
                "{}/{}/{}.git",
                server_base(config),
                credentials.username,
                deployment_id
            ),
        };

        Ok(GitClient {
            deployment_id: deployment_id.to_string(),
            remote_url,
            rest_base: server_base(config),
            username: credentials.username,
            password: credentials.password,
            proxy: config.git_proxy.clone(),
            ca_cert: credentials.ca_cert.or(cached_ca),
            base_dir,
            http,
        })
    }

    /// The remote URL handed to `GitRepo` bindings.
    #[must_use]
    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// The local working directory for this deployment.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let username = self.username.clone();
        let password = self.password.clone();
        callbacks.credentials(move |_url, username_from_url, _allowed| {
            Cred::userpass_plaintext(username_from_url.unwrap_or(&username), &password)
        });
        // libgit2 cannot take a per-connection CA bundle; when the platform
        // mounts its own CA we accept the server certificate here and rely on
        // the REST path to verify against the same bundle.
        if self.ca_cert.is_some() {
            callbacks.certificate_check(|_cert, _host| {
                Ok(git2::CertificateCheckStatus::CertificateOk)
            });
        }
        callbacks
    }

    fn proxy_options(&self) -> ProxyOptions<'_> {
        let mut proxy = ProxyOptions::new();
        if let Some(url) = &self.proxy {
            proxy.url(url);
        }
        proxy
    }

    /// Probe whether the remote repository exists.
    ///
    /// "repository not found" and "authentication required" both mean the
    /// repository is not visible and map to `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Network`] on transport failures.
    pub async fn exists_on_remote(&self) -> Result<bool, GitError> {
        let this = self.clone();
        let result = tokio::task::spawn_blocking(move || this.exists_blocking())
            .await
            .map_err(|e| GitError::Internal(format!("blocking task failed: {e}")))?;
        record_git_operation("exists", result.is_ok());
        result
    }

    fn exists_blocking(&self) -> Result<bool, GitError> {
        let mut remote = git2::Remote::create_detached(self.remote_url.as_str())?;
        let result = match remote.connect_auth(
            Direction::Fetch,
            Some(self.callbacks()),
            Some(self.proxy_options()),
        ) {
            Ok(_) => Ok(true),
            Err(e) if means_absent(&e) => {
                debug!(
                    deployment_id = %self.deployment_id,
                    "Remote not visible ({}), treating as absent",
                    e.message()
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        };
        result
    }

    /// Create the working directory with an empty repository and an `origin`
    /// remote. No initial commit is made.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or repository cannot be created.
    pub async fn initialize(&self) -> Result<(), GitError> {
        let this = self.clone();
        let result = tokio::task::spawn_blocking(move || this.initialize_blocking())
            .await
            .map_err(|e| GitError::Internal(format!("blocking task failed: {e}")))?;
        record_git_operation("init", result.is_ok());
        result
    }

    fn initialize_blocking(&self) -> Result<(), GitError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| GitError::Internal(format!("failed to create working dir: {e}")))?;
        let repo = Repository::init(&self.base_dir)?;
        repo.remote("origin", &self.remote_url)?;
        info!(
            deployment_id = %self.deployment_id,
            dir = %self.base_dir.display(),
            "Initialized empty repository"
        );
        Ok(())
    }

    /// Shallow (depth 1) clone of the remote into the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the clone fails.
    pub async fn clone_from_remote(&self) -> Result<(), GitError> {
        let this = self.clone();
        let result = tokio::task::spawn_blocking(move || this.clone_blocking())
            .await
            .map_err(|e| GitError::Internal(format!("blocking task failed: {e}")))?;
        record_git_operation("clone", result.is_ok());
        result
    }

    fn clone_blocking(&self) -> Result<(), GitError> {
        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(self.callbacks());
        fetch_options.proxy_options(self.proxy_options());
        fetch_options.depth(1);

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_options);
        builder.clone(&self.remote_url, &self.base_dir)?;
        debug!(
            deployment_id = %self.deployment_id,
            "Cloned remote repository (depth 1)"
        );
        Ok(())
    }

    /// Stage everything and commit. No-op when the tree is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error when staging or committing fails.
    pub async fn commit_files(&self) -> Result<(), GitError> {
        let this = self.clone();
        let result = tokio::task::spawn_blocking(move || this.commit_blocking())
            .await
            .map_err(|e| GitError::Internal(format!("blocking task failed: {e}")))?;
        record_git_operation("commit", result.is_ok());
        result
    }

    fn commit_blocking(&self) -> Result<(), GitError> {
        let repo = Repository::open(&self.base_dir)?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let head_commit = repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());

        if let Some(parent) = &head_commit {
            if parent.tree_id() == tree_id {
                debug!(deployment_id = %self.deployment_id, "No changes to commit");
                return Ok(());
            }
        }

        let tree = repo.find_tree(tree_id)?;
        let signature = Signature::now(GIT_COMMIT_AUTHOR_NAME, GIT_COMMIT_AUTHOR_EMAIL)?;
        let parents: Vec<&git2::Commit<'_>> = head_commit.iter().collect();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            GIT_COMMIT_MESSAGE,
            &tree,
            &parents,
        )?;
        info!(deployment_id = %self.deployment_id, "Committed generated configs");
        Ok(())
    }

    /// Push the current branch to `origin`. "already up to date" is success.
    ///
    /// # Errors
    ///
    /// Returns an error when the push is rejected or transport fails.
    pub async fn push_to_remote(&self) -> Result<(), GitError> {
        let this = self.clone();
        let result = tokio::task::spawn_blocking(move || this.push_blocking())
            .await
            .map_err(|e| GitError::Internal(format!("blocking task failed: {e}")))?;
        record_git_operation("push", result.is_ok());
        result
    }

    fn push_blocking(&self) -> Result<(), GitError> {
        let repo = Repository::open(&self.base_dir)?;
        let mut remote = repo.find_remote("origin")?;

        let head = repo.head()?;
        let refname = head
            .name()
            .ok_or_else(|| GitError::Internal("HEAD has no name".to_string()))?
            .to_string();
        let refspec = format!("{refname}:{refname}");

        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(self.callbacks());
        push_options.proxy_options(self.proxy_options());

        match remote.push(&[refspec.as_str()], Some(&mut push_options)) {
            Ok(()) => {
                info!(deployment_id = %self.deployment_id, "Pushed to remote");
                Ok(())
            }
            Err(e) if e.message().to_lowercase().contains("up to date") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the remote repository via the Gitea REST API.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] when the repository does not exist,
    /// [`GitError::Auth`] on credential rejection, [`GitError::Network`] on
    /// transport failure.
    pub async fn delete(&self) -> Result<(), GitError> {
        let url = format!(
            "{}/api/v1/repos/{}/{}",
            self.rest_base, self.username, self.deployment_id
        );

        let client = self.rest_client()?;
        let response = client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| GitError::Network(e.to_string()))?;

        let status = response.status();
        let result = if status.is_success() {
            info!(deployment_id = %self.deployment_id, "Deleted remote repository");
            Ok(())
        } else if status.as_u16() == 404 {
            Err(GitError::NotFound(format!(
                "repository {} does not exist",
                self.deployment_id
            )))
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(GitError::Auth(format!(
                "repository deletion rejected with {status}"
            )))
        } else {
            Err(GitError::Internal(format!(
                "repository deletion failed with {status}"
            )))
        };
        record_git_operation("delete", result.is_ok());
        result
    }

    /// REST client honoring the configured CA bundle.
    fn rest_client(&self) -> Result<reqwest::Client, GitError> {
        match &self.ca_cert {
            None => Ok(self.http.clone()),
            Some(pem) => {
                let cert = reqwest::Certificate::from_pem(pem)
                    .map_err(|e| GitError::Internal(format!("invalid CA bundle: {e}")))?;
                reqwest::Client::builder()
                    .add_root_certificate(cert)
                    .build()
                    .map_err(|e| GitError::Internal(format!("failed to build HTTP client: {e}")))
            }
        }
    }
}
