//! Bounded retry with exponential backoff.
//!
//! Only failures that classify themselves as transient are retried. Everything else, and the
//! last transient failure once the attempt budget is spent, is handed back to the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::narration::synth::SynthesisError;

/// Attempt budget and backoff curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Backoff slept after failed attempt number `attempt` (1-based).
    pub fn delay_after_failure(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

/// Failures that know whether another attempt could succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for SynthesisError {
    fn is_transient(&self) -> bool {
        SynthesisError::is_transient(self)
    }
}

/// The error that ended a retry loop, with the number of attempts made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails non-transiently, or the attempt budget is spent.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_transient<F, Fut, T, E>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after_failure(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(RetryExhausted {
                    error: e,
                    attempts: attempt,
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/narration/retry.rs"]
mod tests;
