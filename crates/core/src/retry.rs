//! Bounded retry with exponential backoff.
//!
//! Shared by the API clients and the mirror pusher so throttling and
//! transient network failures are handled in one place instead of ad-hoc
//! sleep-and-retry loops. The whole run blocks during a backoff wait; there
//! is no parallelism to coordinate with.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{CodebergError, GitError, GitHubError};

/// An error that knows whether retrying can help, and optionally how long
/// the server asked us to wait.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-mandated delay (e.g. `Retry-After`), which overrides the
    /// exponential schedule when present.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is exhausted. The last error is returned as-is.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let wait = e.retry_after().unwrap_or(delay).min(policy.max_delay);
                warn!(
                    what,
                    attempt,
                    max_attempts = policy.max_attempts,
                    wait_secs = wait.as_secs(),
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl Retryable for GitHubError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status, .. } => *status >= 500,
            Self::AuthenticationFailed(_) | Self::ParseError(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl Retryable for CodebergError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status, .. } => *status >= 500,
            Self::AuthenticationFailed(_) | Self::Conflict { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl Retryable for GitError {
    // A mirror transfer is retried as a whole; only bad credentials are
    // hopeless.
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::DestinationAuth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FlakyError {
        retryable: bool,
        after: Option<Duration>,
    }

    impl std::fmt::Display for FlakyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky")
        }
    }

    impl Retryable for FlakyError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
        fn retry_after(&self) -> Option<Duration> {
            self.after
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5);

        let result: Result<u32, FlakyError> = retry_with_backoff(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FlakyError {
                        retryable: true,
                        after: None,
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3);

        let result: Result<u32, FlakyError> = retry_with_backoff(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FlakyError {
                    retryable: true,
                    after: None,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5);

        let result: Result<u32, FlakyError> = retry_with_backoff(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FlakyError {
                    retryable: false,
                    after: None,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_mandated_delay_is_honored() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2);
        let start = tokio::time::Instant::now();

        let result: Result<u32, FlakyError> = retry_with_backoff(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FlakyError {
                        retryable: true,
                        after: Some(Duration::from_secs(7)),
                    })
                } else {
                    Ok(1)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[test]
    fn test_error_retryability() {
        use crate::errors::{CodebergError, GitError, GitHubError};

        assert!(GitHubError::RateLimited { retry_after: None }.is_retryable());
        assert!(!GitHubError::AuthenticationFailed("HTTP 401".into()).is_retryable());
        assert!(GitHubError::ApiError {
            status: 502,
            body: "bad gateway".into()
        }
        .is_retryable());
        assert!(!GitHubError::ApiError {
            status: 404,
            body: "not found".into()
        }
        .is_retryable());

        assert!(!CodebergError::Conflict {
            repo: "r".into(),
            detail: "namesake".into()
        }
        .is_retryable());

        assert!(GitError::PushFailed {
            repo: "r".into(),
            detail: "reset".into()
        }
        .is_retryable());
        assert!(!GitError::DestinationAuth {
            repo: "r".into(),
            detail: "401".into()
        }
        .is_retryable());
    }
}
