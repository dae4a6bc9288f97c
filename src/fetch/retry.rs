//! Bounded retry with backoff

use crate::config::RegistryConfig;
use crate::registry::FetchError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Upper bound for a single backoff wait
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry policy for a single registry request
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Wait before retry number `attempt + 1`: base, 3x base, 9x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(3u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }
}

/// Terminal failure of one item after retries ran out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub item: String,
    pub attempts: u32,
    pub error: FetchError,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.item, self.attempts, self.error
        )
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    item: &str,
    mut op: F,
) -> Result<T, FetchFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                debug!(
                    item,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after {}",
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(FetchFailure {
                    item: item.to_string(),
                    attempts: attempt + 1,
                    error,
                })
            }
        }
    }
}
