//! The orchestration engine: enumerate, filter, ensure, push, summarize.
//!
//! Repositories are processed strictly one at a time, in name-ascending
//! order for reproducible logs. Per-repository failures are recorded and
//! never stop the loop; only a failed source enumeration aborts the run,
//! since a partial listing would silently drop repositories from mirroring.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use mirrorberg_core::codeberg::{CodebergClient, EnsureOutcome};
use mirrorberg_core::errors::{CodebergError, CoreError, GitError, GitHubError};
use mirrorberg_core::exclusions::ExclusionSet;
use mirrorberg_core::github::GitHubClient;
use mirrorberg_core::models::{MirrorOutcome, MirrorResult, RepositoryDescriptor, RunSummary};
use mirrorberg_core::pusher::MirrorPusher;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Source platform: enumerates the repositories to mirror.
#[allow(async_fn_in_trait)]
pub trait SourceHost {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>, GitHubError>;
}

/// Destination platform: create-if-absent and push-remote addressing.
#[allow(async_fn_in_trait)]
pub trait DestinationHost {
    async fn ensure_repository(
        &self,
        repo: &RepositoryDescriptor,
    ) -> Result<EnsureOutcome, CodebergError>;

    fn push_url(&self, name: &str) -> String;
}

/// Git transport: full mirror-mode transfer of one repository.
#[allow(async_fn_in_trait)]
pub trait RepoPusher {
    async fn mirror(&self, repo: &RepositoryDescriptor, dest_url: &str) -> Result<(), GitError>;
}

/// The real source host: a [`GitHubClient`] bound to the origin account.
pub struct GitHubSource {
    pub client: GitHubClient,
    pub username: String,
}

impl SourceHost for GitHubSource {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>, GitHubError> {
        self.client.list_owned_repositories(&self.username).await
    }
}

impl DestinationHost for CodebergClient {
    async fn ensure_repository(
        &self,
        repo: &RepositoryDescriptor,
    ) -> Result<EnsureOutcome, CodebergError> {
        CodebergClient::ensure_repository(self, repo).await
    }

    fn push_url(&self, name: &str) -> String {
        CodebergClient::push_url(self, name)
    }
}

impl RepoPusher for MirrorPusher {
    async fn mirror(&self, repo: &RepositoryDescriptor, dest_url: &str) -> Result<(), GitError> {
        MirrorPusher::mirror(self, repo, dest_url).await
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// What a run would do, without doing it. Produced by [`MirrorEngine::plan`].
#[derive(Debug, Clone)]
pub struct MirrorPlan {
    /// Survivors of the exclusion filter, name-ascending.
    pub to_mirror: Vec<RepositoryDescriptor>,
    /// Excluded repository names, name-ascending.
    pub excluded: Vec<String>,
}

/// Sequences one mirroring run over immutable clients.
pub struct MirrorEngine<S, D, P> {
    source: S,
    dest: D,
    pusher: P,
    exclusions: ExclusionSet,
    repo_delay: Duration,
}

impl<S, D, P> MirrorEngine<S, D, P>
where
    S: SourceHost,
    D: DestinationHost,
    P: RepoPusher,
{
    pub fn new(
        source: S,
        dest: D,
        pusher: P,
        exclusions: ExclusionSet,
        repo_delay: Duration,
    ) -> Self {
        Self {
            source,
            dest,
            pusher,
            exclusions,
            repo_delay,
        }
    }

    /// Enumerate and filter without touching the destination.
    pub async fn plan(&self) -> Result<MirrorPlan, CoreError> {
        let repos = self.enumerate().await?;
        let (excluded, to_mirror): (Vec<_>, Vec<_>) = repos
            .into_iter()
            .partition(|repo| self.exclusions.contains(&repo.name));
        Ok(MirrorPlan {
            to_mirror,
            excluded: excluded.into_iter().map(|r| r.name).collect(),
        })
    }

    /// Run the full mirroring job.
    ///
    /// Every enumerated repository yields exactly one [`MirrorResult`]:
    /// excluded names are recorded as skipped without any destination call,
    /// everything else is ensured and pushed. Failures are isolated per
    /// repository.
    pub async fn run(&self) -> Result<RunSummary, CoreError> {
        let mut summary = RunSummary {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let repos = self.enumerate().await?;
        info!(
            count = repos.len(),
            excluded = self.exclusions.len(),
            "starting mirroring run"
        );

        for repo in &repos {
            if self.exclusions.contains(&repo.name) {
                info!(repo = %repo.name, "skipping excluded repository");
                summary.record(MirrorResult {
                    repository_name: repo.name.clone(),
                    outcome: MirrorOutcome::SkippedExcluded,
                });
                continue;
            }

            let outcome = self.mirror_one(repo).await;
            if let MirrorOutcome::Failed(ref reason) = outcome {
                error!(repo = %repo.name, reason = %reason, "repository mirror failed");
            } else {
                info!(repo = %repo.name, outcome = %outcome, "repository mirrored");
            }
            summary.record(MirrorResult {
                repository_name: repo.name.clone(),
                outcome,
            });

            // Breathe between repositories to respect API rate limits.
            if !self.repo_delay.is_zero() {
                tokio::time::sleep(self.repo_delay).await;
            }
        }

        summary.completed_at = Some(Utc::now());
        info!(%summary, "mirroring run completed");
        for failure in summary.failures() {
            warn!(repo = %failure.repository_name, outcome = %failure.outcome, "failed repository");
        }
        Ok(summary)
    }

    /// Enumerate the source, name-ascending. Failure here is fatal for the
    /// run.
    async fn enumerate(&self) -> Result<Vec<RepositoryDescriptor>, CoreError> {
        let mut repos = self.source.list_repositories().await.map_err(|e| {
            error!(error = %e, "source enumeration failed, aborting run");
            CoreError::GitHub(e)
        })?;
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    /// Ensure-then-push for one repository. Any error becomes a `Failed`
    /// outcome; the caller keeps iterating.
    async fn mirror_one(&self, repo: &RepositoryDescriptor) -> MirrorOutcome {
        let ensured = match self.dest.ensure_repository(repo).await {
            Ok(ensured) => ensured,
            Err(e) => return MirrorOutcome::Failed(e.to_string()),
        };

        let dest_url = self.dest.push_url(&repo.name);
        if let Err(e) = self.pusher.mirror(repo, &dest_url).await {
            return MirrorOutcome::Failed(e.to_string());
        }

        match ensured {
            EnsureOutcome::Created => MirrorOutcome::CreatedAndPushed,
            EnsureOutcome::AlreadyExists => MirrorOutcome::UpdatedAndPushed,
        }
    }
}
