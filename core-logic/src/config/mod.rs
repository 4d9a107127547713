use crate::error::ConfigError;
use crate::utils::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs for one batch run: pool size, attempt cap and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Delay between two entities taken by the same worker.
    pub entity_pacing_ms: u64,
    pub backoff_multiplier: f64,
    pub max_retry_delay_ms: u64,
    pub jitter: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 3,
            retry_delay_ms: 3000,
            entity_pacing_ms: 0,
            backoff_multiplier: 1.0,
            max_retry_delay_ms: 60_000,
            jitter: false,
        }
    }
}

impl BatchConfig {
    /// Transaction flow: low concurrency to keep the RPC endpoint unsaturated.
    pub fn claim() -> Self {
        Self::default()
    }

    /// HTTP flow: wider pool, shorter retry delay, paced per worker.
    pub fn faucet() -> Self {
        Self {
            concurrency: 5,
            retry_delay_ms: 2000,
            entity_pacing_ms: 3000,
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                reason: format!("expected >= 1.0, got {}", self.backoff_multiplier),
            });
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay_ms)
            .with_backoff(self.backoff_multiplier, self.max_retry_delay_ms)
            .with_jitter(self.jitter)
            .with_entity_pacing(Duration::from_millis(self.entity_pacing_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}
