//! Retry with exponential backoff for transient adapter failures.

use crate::adapters::AdapterError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// When and how often a failed request is reissued. The policy is explicit
/// state on the adapter, not an ambient loop counter.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub retry_on: fn(&AdapterError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            retry_on: AdapterError::is_retryable,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retries` (1-based). Rate-limit responses
    /// that carry a `Retry-After` hint use it instead of the exponential.
    fn backoff_for(&self, error: &AdapterError, retries: u32) -> Duration {
        let exponential = self.backoff_base * 2u32.saturating_pow(retries.min(16));
        let backoff = match error {
            AdapterError::RateLimited { retry_after } => retry_after.unwrap_or(exponential),
            _ => exponential,
        };
        backoff.min(self.backoff_cap)
    }

    /// Runs `op` until it succeeds, fails non-retryably, or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let mut retries = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if (self.retry_on)(&e) && retries + 1 < self.max_attempts => {
                    retries += 1;
                    let backoff = self.backoff_for(&e, retries);

                    warn!(
                        error = %e,
                        retry = retries,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
