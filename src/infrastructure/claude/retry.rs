use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::errors::ClaudeApiError;
use crate::domain::models::RetryConfig;

/// Retry policy with exponential backoff for transient errors
///
/// Backoff doubles with each retry and is capped at `max_backoff_ms`.
/// Retries 429, 5xx, network errors and timeouts; fails fast on the rest.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    pub const fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Execute an operation with exponential backoff retry logic
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ClaudeApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClaudeApiError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retrying");
                    }
                    return Ok(result);
                }
                Err(err) if self.should_retry(&err, attempt) => {
                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        error = %err,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Transient error, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt >= self.max_retries && err.is_transient() {
                        warn!(attempts = attempt + 1, error = %err, "Giving up after retries");
                    } else {
                        debug!(error = %err, "Non-retryable error");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// min(initial_backoff * 2^attempt, max_backoff)
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }

    const fn should_retry(&self, error: &ClaudeApiError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
