use crate::llm::types::LLMError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with linear backoff: the wait after attempt `n` is `retry_delay × n`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Successful result plus the failures that preceded it
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
    pub failures: Vec<LLMError>,
    pub total_delay: Duration,
}

/// Every attempt failed, or a permanent error stopped the loop
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: LLMError,
    pub failures: Vec<LLMError>,
    pub total_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Delay slept after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.retry_delay * attempt
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempts run out.
    /// The operation receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<RetryOutcome<T>, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LLMError>>,
    {
        let max_attempts = self.max_retries.max(1);
        let mut failures = Vec::new();
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                        failures,
                        total_delay,
                    });
                }
                Err(error) => {
                    failures.push(error.clone());

                    if !error.is_retryable() || attempt >= max_attempts {
                        warn!(
                            "Giving up after attempt {}/{}: {}",
                            attempt, max_attempts, error
                        );
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: error,
                            failures,
                            total_delay,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    total_delay += delay;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}
