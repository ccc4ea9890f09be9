//! GitHub REST API client -- the source enumerator.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::errors::GitHubError;
use crate::models::{RepositoryDescriptor, Visibility};
use crate::retry::{retry_with_backoff, RetryPolicy};

const PER_PAGE: usize = 100;

/// A repository as returned by `GET /user/repos`.
#[derive(Debug, Clone, Deserialize)]
struct RepoListItem {
    name: String,
    full_name: String,
    private: bool,
    default_branch: Option<String>,
    clone_url: String,
    description: Option<String>,
    owner: OwnerSummary,
}

#[derive(Debug, Clone, Deserialize)]
struct OwnerSummary {
    login: String,
}

impl From<RepoListItem> for RepositoryDescriptor {
    fn from(item: RepoListItem) -> Self {
        Self {
            name: item.name,
            full_name: item.full_name,
            owner: item.owner.login,
            description: item.description,
            visibility: if item.private {
                Visibility::Private
            } else {
                Visibility::Public
            },
            default_branch: item.default_branch.unwrap_or_else(|| "main".into()),
            clone_url: item.clone_url,
        }
    }
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("mirrorberg/0.1"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("failed to build reqwest client");
        info!(api_url = %api_url, "created GitHubClient");
        Self {
            http,
            api_url,
            token,
            retry,
        }
    }

    /// List every repository owned by `username`, across all pages.
    ///
    /// Pagination is transparent to the caller. Repositories the token can
    /// see but that belong to a different account (organization repos) are
    /// filtered out and logged, matching the job's personal-account scope.
    /// Throttling and transport failures are retried per page request with
    /// bounded backoff.
    #[instrument(skip(self))]
    pub async fn list_owned_repositories(
        &self,
        username: &str,
    ) -> Result<Vec<RepositoryDescriptor>, GitHubError> {
        let mut repos = Vec::new();
        let mut page = 1usize;

        loop {
            let items = retry_with_backoff(&self.retry, "github list repos", || {
                self.fetch_page(page)
            })
            .await?;
            let count = items.len();

            for item in items {
                if item.owner.login != username {
                    info!(
                        repo = %item.full_name,
                        owner = %item.owner.login,
                        "skipping repository owned by another account"
                    );
                    continue;
                }
                repos.push(RepositoryDescriptor::from(item));
            }

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(count = repos.len(), "enumerated owned repositories");
        Ok(repos)
    }

    async fn fetch_page(&self, page: usize) -> Result<Vec<RepoListItem>, GitHubError> {
        let url = format!("{}/user/repos", self.api_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;
        check_response(resp.status(), resp.headers())?;
        let items: Vec<RepoListItem> = resp
            .json()
            .await
            .map_err(|e| GitHubError::ParseError(e.to_string()))?;
        debug!(page, count = items.len(), "fetched repository page");
        Ok(items)
    }
}

/// Classify a GitHub response status.
///
/// 401 is always an authentication failure. 403 is ambiguous: with the
/// primary rate limit exhausted (`x-ratelimit-remaining: 0`) it is
/// throttling, otherwise bad credentials. 429 is the secondary rate limit.
fn check_response(status: StatusCode, headers: &HeaderMap) -> Result<(), GitHubError> {
    if status.is_success() {
        return Ok(());
    }

    let remaining = header_str(headers, "x-ratelimit-remaining");
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && remaining == Some("0"))
    {
        let retry_after = header_str(headers, "retry-after")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .or_else(|| reset_delay(headers));
        warn!(status = status.as_u16(), ?retry_after, "GitHub rate limited");
        return Err(GitHubError::RateLimited { retry_after });
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(GitHubError::AuthenticationFailed(format!(
            "HTTP {}",
            status
        )));
    }

    Err(GitHubError::ApiError {
        status: status.as_u16(),
        body: format!("HTTP {}", status),
    })
}

/// Delay until the `x-ratelimit-reset` epoch, if the header is present.
fn reset_delay(headers: &HeaderMap) -> Option<Duration> {
    let reset: i64 = header_str(headers, "x-ratelimit-reset")?.parse().ok()?;
    let now = chrono::Utc::now().timestamp();
    Some(Duration::from_secs((reset - now).max(1) as u64))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
