//! Retry policy and executor for provider calls
//!
//! Exponential backoff with multiplicative jitter. A vendor-supplied
//! retry-after value replaces the computed delay and gets no jitter.

use crate::config::RetrySettings;
use crate::providers::error::{ProviderError, ProviderResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff schedule shared by every vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    pub max_delay_ms: u64,

    /// Jitter is drawn from `[0, jitter_factor)` per attempt
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            jitter_factor: settings.jitter_factor,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Delay before retrying after failed attempt number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after {
            return Duration::from_millis(seconds.saturating_mul(1000).min(self.max_delay_ms));
        }

        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(0.0..self.jitter_factor)
        } else {
            0.0
        };
        self.backoff(attempt, jitter)
    }

    /// Backoff for a fixed jitter value, capped at `max_delay_ms`
    pub fn backoff(&self, attempt: u32, jitter: f64) -> Duration {
        let exponential = 2f64.powi(attempt.min(62) as i32);
        let delay = self.base_delay_ms as f64 * exponential * (1.0 + jitter);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    /// True while attempts remain and the error is transient
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The final outcome: the first success, or the last error
    pub result: ProviderResult<T>,

    /// Number of attempts made, including the first
    pub attempts: u32,

    /// Every delay slept between attempts, in order
    pub delays: Vec<Duration>,
}

impl<T> RetryResult<T> {
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Executor for retry operations
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// exhausts the policy, or `cancel` fires.
    ///
    /// The operation receives the 0-based attempt number. Backoff sleeps are
    /// timer awaits and never block other tasks.
    pub async fn execute<F, Fut, T>(&self, mut operation: F, cancel: &CancellationToken) -> RetryResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        let mut delays = Vec::new();

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                result = operation(attempt) => result,
            };

            let error = match result {
                Ok(value) => {
                    return RetryResult {
                        result: Ok(value),
                        attempts: attempt + 1,
                        delays,
                    }
                }
                Err(error) => error,
            };

            if !self.policy.should_retry(&error, attempt) {
                if attempt > 0 {
                    debug!("Giving up after {} attempts: {}", attempt + 1, error);
                }
                return RetryResult {
                    result: Err(error),
                    attempts: attempt + 1,
                    delays,
                };
            }

            let delay = self.policy.calculate_delay(attempt, error.retry_after());
            warn!(
                "Attempt {} failed, retrying in {}ms: {}",
                attempt + 1,
                delay.as_millis(),
                error
            );
            delays.push(delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return RetryResult {
                        result: Err(ProviderError::Cancelled),
                        attempts: attempt + 1,
                        delays,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
