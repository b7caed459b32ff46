//! Retry of remote calls that hit rate limits.
//!
//! Only rate-limit and quota errors ([`SourceError::is_rate_limited`]) are
//! retried. The delay before attempt `n + 1` is `step * n`, slept on the
//! injected [`Clock`].

use crate::clock::Clock;
use crate::error::SourceError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made. The last error is returned.
pub async fn with_retry<F, Fut, T>(
    clock: &dyn Clock,
    policy: &RetryPolicy,
    what: &str,
    mut call: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(what, attempts = attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    what,
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_secs = delay.as_secs(),
                    "Rate limited, retrying"
                );
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_rate_limited() {
                    tracing::error!(what, error = %e, attempts = attempt, "Giving up after retries");
                } else {
                    tracing::error!(what, error = %e, "Call failed");
                }
                return Err(e);
            }
        }
    }
}
