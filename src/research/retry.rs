//! Bounded retry with exponential backoff
//!
//! Every capability call made by a task goes through [`RetryPolicy::run`]:
//! each attempt is bounded by the stage timeout, retryable failures back off
//! exponentially with jitter, and cancellation interrupts both attempts and
//! backoff sleeps.

use crate::capabilities::CapabilityError;
use crate::utils::toml_config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backoff parameters resolved from `[orchestration.retry]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier.max(1.0),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attempted<T> {
    Succeeded { value: T, attempts: u32 },
    Failed { error: CapabilityError, attempts: u32 },
    Cancelled,
}

/// A retry that is about to happen.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
    /// The attempt about to start (2 for the first retry)
    pub attempt: u32,
    pub delay: Duration,
    pub error: CapabilityError,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after `failures` failed attempts (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1) as i32;
        let base = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let jittered = if self.jitter > 0.0 {
            let factor = rand::rng().random_range(-self.jitter..=self.jitter);
            base * (1.0 + factor)
        } else {
            base
        };
        let capped = jittered.max(0.0).min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts or
    /// `cancel` fires.
    ///
    /// Each attempt is limited to `timeout`; an attempt that overruns fails
    /// with [`CapabilityError::Timeout`]. `on_retry` is called before every
    /// backoff sleep.
    pub async fn run<T, F, Fut, R>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        mut on_retry: R,
        mut op: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
        R: FnMut(RetryNotice),
    {
        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => return Attempted::Cancelled,
                r = tokio::time::timeout(timeout, op()) => r,
            };

            let error = match outcome {
                Ok(Ok(value)) => {
                    return Attempted::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Ok(Err(error)) => error,
                Err(_) => CapabilityError::Timeout(timeout.as_millis() as u64),
            };

            if !error.is_retryable() || attempt >= self.max_attempts {
                return Attempted::Failed {
                    error,
                    attempts: attempt,
                };
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying capability call"
            );
            on_retry(RetryNotice {
                attempt: attempt + 1,
                delay,
                error,
            });

            tokio::select! {
                () = cancel.cancelled() => return Attempted::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
