//! Bounded retry with pluggable backoff.
//!
//! A `RetryPolicy` is a plain value describing how many times a delivery may
//! be retried and how long to wait in between. The waiting itself goes through
//! a `Sleeper` so tests can drive the loop without real delays.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay between two consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Always wait the same amount of time.
    Fixed { delay: Duration },
    /// Double the delay after every failed attempt, up to `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay to apply after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Errors that can tell whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// How a delivery is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn exponential(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential { initial, max },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `op` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    ///
    /// No delay follows the final failed attempt.
    pub async fn run<T, E, F, Fut>(&self, sleeper: &dyn Sleeper, mut op: F) -> RetryOutcome<T, E>
    where
        E: Display + Retryable,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts();
        let mut errors = Vec::new();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Delivery succeeded after retrying");
                    }
                    return RetryOutcome {
                        attempts: attempt,
                        result: Ok(value),
                        errors,
                    };
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, "Delivery failed with a permanent error");
                    return RetryOutcome {
                        attempts: attempt,
                        result: Err(e),
                        errors,
                    };
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(attempt, max_attempts, error = %e, "Final delivery attempt failed");
                    return RetryOutcome {
                        attempts: attempt,
                        result: Err(e),
                        errors,
                    };
                }
                Err(e) => {
                    let delay = self.backoff.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Delivery attempt failed, retrying in {:?}",
                        delay
                    );
                    errors.push(e);
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// What happened while running a `RetryPolicy`.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Attempts made, including the last one.
    pub attempts: u32,
    /// Value of the successful attempt, or the error of the last one.
    pub result: Result<T, E>,
    /// Errors of the earlier, retried attempts.
    pub errors: Vec<E>,
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
