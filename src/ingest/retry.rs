// src/ingest/retry.rs
//! Bounded, fixed-delay retry around upstream fetches.
//!
//! The policy never lets an error escape: exhaustion comes back as
//! [`RetryOutcome::Exhausted`] and the caller decides to skip the unit of work.

use metrics::counter;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Success(T),
    Exhausted { attempts: u32, last_error: String },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            RetryOutcome::Success(v) => Some(v),
            RetryOutcome::Exhausted { .. } => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts invocations, so 0 is treated as 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or `max_attempts` invocations have failed.
    /// `context` describes the request and is only used for logging.
    pub async fn execute<T, F, Fut>(&self, context: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return RetryOutcome::Success(v),
                Err(e) => {
                    let last_error = format!("{e:#}");
                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            target: "ingest",
                            context,
                            attempts = attempt,
                            error = %last_error,
                            "giving up after retries"
                        );
                        counter!("ingest_fetch_exhausted_total").increment(1);
                        return RetryOutcome::Exhausted {
                            attempts: attempt,
                            last_error,
                        };
                    }
                    tracing::warn!(
                        target: "ingest",
                        context,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = self.delay.as_secs_f64(),
                        error = %last_error,
                        "fetch failed, retrying"
                    );
                    counter!("ingest_fetch_retries_total").increment(1);
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
    }
}
