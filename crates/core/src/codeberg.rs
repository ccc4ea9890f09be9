//! Codeberg (Gitea) REST API client -- the destination repository ensurer.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use crate::errors::CodebergError;
use crate::models::RepositoryDescriptor;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// What [`CodebergClient::ensure_repository`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The repository was created on the destination.
    Created,
    /// The repository was already present; nothing was mutated.
    AlreadyExists,
}

/// Asynchronous Codeberg REST API client.
#[derive(Clone)]
pub struct CodebergClient {
    http: reqwest::Client,
    api_url: String,
    base_url: String,
    username: String,
    token: String,
    retry: RetryPolicy,
}

impl CodebergClient {
    pub fn new(
        api_url: impl Into<String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("mirrorberg/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("failed to build reqwest client");
        let username = username.into();
        info!(api_url = %api_url, username = %username, "created CodebergClient");
        Self {
            http,
            api_url,
            base_url,
            username,
            token: token.into(),
            retry,
        }
    }

    /// Destination account that owns the mirrors.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// HTTPS push URL for a mirror repository. Credentials are injected by
    /// the pusher's callbacks, never embedded here.
    pub fn push_url(&self, name: &str) -> String {
        format!("{}/{}/{}.git", self.base_url, self.username, name)
    }

    /// Make sure a repository of this name exists under the configured
    /// account, creating it with matching visibility when absent.
    ///
    /// Idempotent: a second call with the same input is a no-op returning
    /// [`EnsureOutcome::AlreadyExists`]. An ambiguous response (name taken
    /// in a way we cannot attribute to our own account) surfaces as
    /// [`CodebergError::Conflict`] and is never resolved by overwriting.
    #[instrument(skip(self, repo), fields(repo = %repo.name))]
    pub async fn ensure_repository(
        &self,
        repo: &RepositoryDescriptor,
    ) -> Result<EnsureOutcome, CodebergError> {
        let exists = retry_with_backoff(&self.retry, "codeberg get repo", || {
            self.repository_exists(&repo.name)
        })
        .await?;

        if exists {
            debug!("repository already present on destination");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        retry_with_backoff(&self.retry, "codeberg create repo", || {
            self.create_repository(repo)
        })
        .await?;
        info!(private = repo.is_private(), "created destination repository");
        Ok(EnsureOutcome::Created)
    }

    /// `GET /repos/{owner}/{name}` -- true on 200, false on 404.
    async fn repository_exists(&self, name: &str) -> Result<bool, CodebergError> {
        let url = format!("{}/repos/{}/{}", self.api_url, self.username, name);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_response(name, resp.status(), resp.headers())?;
        Ok(true)
    }

    /// `POST /user/repos` with the source repository's visibility and
    /// description.
    async fn create_repository(&self, repo: &RepositoryDescriptor) -> Result<(), CodebergError> {
        let url = format!("{}/user/repos", self.api_url);
        let description = repo
            .description
            .clone()
            .unwrap_or_else(|| format!("Mirror of {}", repo.full_name));
        let payload = serde_json::json!({
            "name": repo.name,
            "description": description,
            "private": repo.is_private(),
            "auto_init": false,
        });
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .json(&payload)
            .send()
            .await?;
        check_response(&repo.name, resp.status(), resp.headers())
    }
}

/// Classify a Codeberg response status.
///
/// 409 means the name is already taken in a way the presence check did not
/// account for (e.g. a namesake under different ownership) and is treated
/// as a per-repository conflict, never an overwrite.
fn check_response(
    repo: &str,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<(), CodebergError> {
    if status.is_success() {
        return Ok(());
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
            CodebergError::AuthenticationFailed(format!("HTTP {}", status)),
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!(repo, ?retry_after, "Codeberg rate limited");
            Err(CodebergError::RateLimited { retry_after })
        }
        StatusCode::CONFLICT => Err(CodebergError::Conflict {
            repo: repo.to_string(),
            detail: "repository name already taken".into(),
        }),
        _ => Err(CodebergError::ApiError {
            status: status.as_u16(),
            body: format!("HTTP {}", status),
        }),
    }
}
