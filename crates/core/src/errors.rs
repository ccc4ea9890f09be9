//! Error types for the mirrorberg core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Codeberg(#[from] CodebergError),

    #[error(transparent)]
    Git(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
///
/// All of these are fatal and raised before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing {
        var: String,
        field: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitHub (source platform) errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.). Retried with
    /// bounded attempts before surfacing.
    #[error("GitHub transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// Authentication token is missing or invalid. Not retryable.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded. Retried after the server-mandated delay when
    /// one is given, otherwise with exponential backoff.
    #[error("GitHub rate limit exceeded")]
    RateLimited {
        retry_after: Option<Duration>,
    },

    /// JSON deserialization failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Codeberg (destination platform) errors
// ---------------------------------------------------------------------------

/// Errors from Codeberg (Gitea) REST API interactions.
#[derive(Debug, Error)]
pub enum CodebergError {
    /// HTTP-level transport error.
    #[error("Codeberg transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("Codeberg API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// Authentication token is missing or invalid.
    #[error("Codeberg authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("Codeberg rate limit exceeded")]
    RateLimited {
        retry_after: Option<Duration>,
    },

    /// The repository name is already taken in an ambiguous way (e.g. a
    /// namesake under different ownership). Never resolved by overwriting;
    /// the affected repository is marked failed and the run continues.
    #[error("Codeberg naming conflict for repository '{repo}': {detail}")]
    Conflict {
        repo: String,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Git transport errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) clone and mirror-push operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Cloning the source repository failed.
    #[error("clone failed for '{repo}': {detail}")]
    CloneFailed {
        repo: String,
        detail: String,
    },

    /// The destination rejected our credentials.
    #[error("destination authentication failed for '{repo}': {detail}")]
    DestinationAuth {
        repo: String,
        detail: String,
    },

    /// The mirror push failed after exhausting retries.
    #[error("mirror push failed for '{repo}': {detail}")]
    PushFailed {
        repo: String,
        detail: String,
    },

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper (scratch directory handling).
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
