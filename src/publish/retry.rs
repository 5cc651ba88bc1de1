//! Retry logic with bounded exponential backoff
//!
//! Total wait is capped: at most `max_attempts - 1` sleeps, each no longer
//! than `max_delay`.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule for retried operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before attempt `attempt + 1`, given `attempt` failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Longest total time spent sleeping between attempts
    pub fn max_total_delay(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

/// Retry an async operation with exponential backoff
///
/// `operation` receives the 1-based attempt number. Errors for which
/// `is_retryable` returns false are returned immediately.
///
/// # Returns
/// * `Ok(T)` if operation succeeds within `max_attempts`
/// * `Err(E)` with the last error otherwise
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "Attempt {}/{} failed: {}, retrying after {:?}",
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) if !is_retryable(&e) => {
                tracing::error!("Attempt {} failed permanently: {}", attempt, e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("All {} attempts failed. Last error: {}", max_attempts, e);
                return Err(e);
            }
        }
    }
}
