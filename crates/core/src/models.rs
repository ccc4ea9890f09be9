//! Domain model types used throughout mirrorberg.
//!
//! These types bridge the API clients, the mirror pusher, and the
//! orchestration engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repository descriptor
// ---------------------------------------------------------------------------

/// Repository visibility on either platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Private => write!(f, "private"),
        }
    }
}

/// A source repository as enumerated from the origin platform.
///
/// Produced once per repository per run and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Repository name, unique per account.
    pub name: String,
    /// `owner/name` form.
    pub full_name: String,
    /// Owning account login.
    pub owner: String,
    /// Free-form description, if any.
    pub description: Option<String>,
    pub visibility: Visibility,
    /// Default branch name (e.g. `main`).
    pub default_branch: String,
    /// HTTPS clone URL.
    pub clone_url: String,
}

impl RepositoryDescriptor {
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }
}

// ---------------------------------------------------------------------------
// Mirror results
// ---------------------------------------------------------------------------

/// Outcome of processing a single repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MirrorOutcome {
    /// Repository was created at the destination and pushed.
    CreatedAndPushed,
    /// Repository already existed at the destination; refs were pushed.
    UpdatedAndPushed,
    /// Repository name is on the exclusion list; nothing was done.
    SkippedExcluded,
    /// Ensure or push failed; the reason is carried for the summary.
    Failed(String),
}

impl std::fmt::Display for MirrorOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreatedAndPushed => write!(f, "created_and_pushed"),
            Self::UpdatedAndPushed => write!(f, "updated_and_pushed"),
            Self::SkippedExcluded => write!(f, "skipped_excluded"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-repository result, aggregated into the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorResult {
    pub repository_name: String,
    pub outcome: MirrorOutcome,
}

/// Aggregated outcome of one mirroring run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    /// One entry per processed repository, in processing order.
    pub results: Vec<MirrorResult>,
    /// Timestamp when the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp when the run completed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// Record one result, updating the counters.
    pub fn record(&mut self, result: MirrorResult) {
        match result.outcome {
            MirrorOutcome::CreatedAndPushed => self.created += 1,
            MirrorOutcome::UpdatedAndPushed => self.updated += 1,
            MirrorOutcome::SkippedExcluded => self.skipped += 1,
            MirrorOutcome::Failed(_) => self.failed += 1,
        }
        self.results.push(result);
    }

    /// True when no repository failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Failed results only, for the end-of-run report.
    pub fn failures(&self) -> impl Iterator<Item = &MirrorResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, MirrorOutcome::Failed(_)))
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} failed",
            self.created, self.updated, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, outcome: MirrorOutcome) -> MirrorResult {
        MirrorResult {
            repository_name: name.into(),
            outcome,
        }
    }

    #[test]
    fn test_summary_counters() {
        let mut summary = RunSummary::default();
        summary.record(result("repo-a", MirrorOutcome::CreatedAndPushed));
        summary.record(result("repo-b", MirrorOutcome::SkippedExcluded));
        summary.record(result("repo-c", MirrorOutcome::UpdatedAndPushed));
        summary.record(result("repo-d", MirrorOutcome::Failed("push failed".into())));

        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.failures().count(), 1);
        assert_eq!(summary.to_string(), "1 created, 1 updated, 1 skipped, 1 failed");
    }

    #[test]
    fn test_success_when_no_failures() {
        let mut summary = RunSummary::default();
        summary.record(result("repo-a", MirrorOutcome::CreatedAndPushed));
        assert!(summary.is_success());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(MirrorOutcome::CreatedAndPushed.to_string(), "created_and_pushed");
        assert_eq!(
            MirrorOutcome::Failed("timeout".into()).to_string(),
            "failed: timeout"
        );
    }
}
