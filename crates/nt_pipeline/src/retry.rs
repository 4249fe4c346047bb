//! Exponential backoff around a fallible async operation.
//!
//! The sleep is injected through [`Sleeper`] so the backoff series can be
//! checked without waiting on a real clock.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use nt_core::{Error, ProcessingConfig, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total calls never exceed `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }

    /// Delay before retry number `retry` (zero based): base, base×2, base×4…
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every backoff delay when all retries are used.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries).fold(Duration::ZERO, |acc, retry| acc.saturating_add(self.delay_for(retry)))
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync + fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Final result of a retried operation and how many calls it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Runs `operation` until it succeeds, returns a non-retryable error, or
/// the retry budget is spent. The operation receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut, P>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    is_retryable: P,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let mut retries = 0;
    loop {
        let attempt = retries + 1;
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if retries < policy.max_retries && is_retryable(&e) => {
                let delay = policy.delay_for(retries);
                debug!(attempt, ?delay, error = %e, "retrying after transient failure");
                sleeper.sleep(delay).await;
                retries += 1;
            }
            Err(e) => {
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}
