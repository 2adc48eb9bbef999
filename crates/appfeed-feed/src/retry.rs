//! Bounded retry with capped exponential back-off for feed requests.
//!
//! The vendor feed fails intermittently with non-200 statuses, so every
//! status other than 200 is treated as transient. Only configuration
//! problems (bad template, missing secret) are returned without retrying.

use std::future::Future;
use std::time::Duration;

use crate::error::FeedError;

/// Retry settings for a [`crate::FeedClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first; total attempts are `retry_limit + 1`.
    pub retry_limit: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 10,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// No back-off sleeps; used by tests.
    #[must_use]
    pub fn immediate(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }

    /// Delay before retry number `attempt` (1-based), before jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let computed = self
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        Duration::from_millis(computed.min(self.backoff_max_ms))
    }
}

pub(crate) fn is_retriable(err: &FeedError) -> bool {
    matches!(
        err,
        FeedError::Http(_) | FeedError::UnexpectedStatus { .. }
    )
}

/// Runs `operation` until it succeeds, fails with a non-retriable error, or
/// `policy.retry_limit` retries have been spent. Returns the last error.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, FeedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= policy.retry_limit {
                    return Err(err);
                }
                attempt += 1;
                let capped = policy.delay_for(attempt);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms =
                    (capped.as_millis() as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::info!(
                    attempt,
                    retry_limit = policy.retry_limit,
                    delay_ms,
                    error = %err,
                    "feed request failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
