use crate::traits::Outcome;
use anyhow::{Context, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Verdict for one finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    pub const STOP: RetryDecision = RetryDecision {
        retry: false,
        delay: Duration::ZERO,
    };

    fn after(delay: Duration) -> Self {
        Self { retry: true, delay }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
    pub entity_pacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 3000,
            max_delay_ms: 60_000,
            exponential_base: 1.0,
            jitter: false,
            entity_pacing: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy: `max_attempts` tries, `delay_ms` between them.
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms.max(1).saturating_mul(30),
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, exponential_base: f64, max_delay_ms: u64) -> Self {
        self.exponential_base = exponential_base.max(1.0);
        self.max_delay_ms = max_delay_ms.max(self.base_delay_ms);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_entity_pacing(mut self, pacing: Duration) -> Self {
        self.entity_pacing = pacing;
        self
    }

    /// Success and terminal failures stop at once; a retryable failure is
    /// retried only while `attempt < max_attempts`.
    pub fn should_retry(&self, outcome: &Outcome, attempt: u32) -> RetryDecision {
        match outcome {
            Outcome::Success(_) | Outcome::TerminalFailure(_) => RetryDecision::STOP,
            Outcome::RetryableFailure(_) if attempt >= self.max_attempts => RetryDecision::STOP,
            Outcome::RetryableFailure(_) => RetryDecision::after(self.calculate_delay(attempt)),
        }
    }

    /// Wait after the given (1-based) failed attempt.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.exponential_base.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        let delay_ms = if self.jitter {
            let rng_factor = rand::thread_rng().gen_range(0.5..=1.5);
            delay_ms * rng_factor
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

/// Retries a fallible setup call (pre-flight checks and the like) under the
/// policy's attempt cap and delays.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    let error_msg = format!("{}", e);
                    return Err(e).context(format!(
                        "{} failed after {} attempts. Last error: {}",
                        operation_name, attempt, error_msg
                    ));
                }

                let delay = policy.calculate_delay(attempt);
                debug!(
                    "{} failed (attempt {}/{}). Retrying in {:?}: {}",
                    operation_name, attempt, policy.max_attempts, delay, e
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
