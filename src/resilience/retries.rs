//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failure is retryable (network, timeout, 5xx)
//! - Re-execute the operation with fixed or exponential delay
//! - Stop scheduling attempts once the call is cancelled
//! - Report each scheduled retry to an optional observer
//!
//! # Design Decisions
//! - `ApiError::Auth` is never retried; the session owns that failure
//! - Delays are capped so backoff cannot grow without bound
//! - Cancellation is checked before every attempt and during every delay

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::outcome::Outcome;
use crate::transport::error::{ApiError, ApiResult};

/// Retry policy for one call. Pure configuration, passed by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below 1 behave as 1.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: bool,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn new(max_attempts: u32, delay: Duration, backoff: bool) -> Self {
        Self {
            max_attempts,
            delay,
            backoff,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
            self.backoff,
            self.jitter,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.delay_ms),
            backoff: config.backoff,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

/// A retry about to be scheduled.
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a ApiError,
}

/// Callback invoked before each inter-attempt delay.
pub type RetryObserver = Arc<dyn Fn(&RetryAttempt<'_>) + Send + Sync>;

/// Retry engine bound to a policy, a cancellation token and an observer.
pub struct Retry {
    policy: RetryPolicy,
    cancel: CancellationToken,
    observer: Option<RetryObserver>,
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    /// Stop retrying (and abandon the current attempt) once `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn on_retry(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run `operation` until it succeeds, fails terminally, or is cancelled.
    pub async fn run<T, F, Fut>(self, mut operation: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }

            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => return Outcome::Success(value),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                if attempt > 1 {
                    tracing::warn!(attempts = attempt, error = %error, "Giving up after retries");
                }
                return Outcome::Failure(error);
            }

            let delay = self.policy.delay_after(attempt);
            tracing::info!(attempt, max_attempts, delay = ?delay, error = %error, "Retrying request");
            metrics::record_retry(error.kind());

            if let Some(observer) = &self.observer {
                observer(&RetryAttempt {
                    attempt,
                    delay,
                    error: &error,
                });
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run to a plain result, for callers that cancel by dropping the future.
    ///
    /// A run cancelled through `cancel_on` reports a network error.
    pub async fn run_to_result<T, F, Fut>(self, operation: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        match self.run(operation).await {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(error),
            Outcome::Cancelled => Err(ApiError::Network("retry cancelled".to_string())),
        }
    }
}

/// Run `operation` under `policy` without cancellation.
pub async fn with_retry<T, F, Fut>(operation: F, policy: &RetryPolicy) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    Retry::new(policy.clone()).run_to_result(operation).await
}
