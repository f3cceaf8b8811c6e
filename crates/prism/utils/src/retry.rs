//! Transport retry with exponential backoff.
//!
//! The chain client never retries; the orchestrator wraps the calls it
//! considers retryable with [`with_retries`]. Only errors that report
//! themselves retryable are retried.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Implemented by error types that can distinguish transient transport
/// failures from definitive answers.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry schedule: `base * 2^attempt`, capped.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base: Duration::from_secs(1), cap: Duration::from_secs(30) }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Runs `op`, retrying retryable errors up to `policy.max_retries` times.
pub async fn with_retries<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(%error, label, attempt, delay_ms = delay.as_millis() as u64, "Retrying.");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
