use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// One account processed by a batch run.
///
/// Immutable once loaded. The runner shares it behind an `Arc` with exactly
/// one worker at a time; the key is wiped when the last reference drops.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Entity {
    index: usize,
    address: String,
    private_key: String,
    balance: Option<f64>,
}

impl Entity {
    pub fn new(index: usize, address: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            index,
            address: address.into(),
            private_key: private_key.into(),
            balance: None,
        }
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = Some(balance);
        self
    }

    /// Position in the input list (0-based).
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn balance(&self) -> Option<f64> {
        self.balance
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("index", &self.index)
            .field("address", &self.address)
            .field("private_key", &"***REDACTED***")
            .field("balance", &self.balance)
            .finish()
    }
}

/// What a single attempt produced besides its classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptDetail {
    /// Correlation token, e.g. a transaction hash.
    pub token: Option<String>,
    pub reason: Option<String>,
    /// Adapter-specific report fields (`tx_hash`, `response`, ...).
    pub fields: Map<String, Value>,
}

/// Classified result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(AttemptDetail),
    /// Definitive stop, e.g. "already claimed" or an on-chain revert.
    TerminalFailure(AttemptDetail),
    RetryableFailure(AttemptDetail),
}

impl Outcome {
    pub fn success() -> Self {
        Outcome::Success(AttemptDetail::default())
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Outcome::TerminalFailure(AttemptDetail {
            reason: Some(reason.into()),
            ..Default::default()
        })
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Outcome::RetryableFailure(AttemptDetail {
            reason: Some(reason.into()),
            ..Default::default()
        })
    }

    /// Classifies an adapter error: terminal if the message contains one of
    /// `terminal_markers` (case-insensitive), retryable otherwise.
    pub fn from_error(error: &anyhow::Error, terminal_markers: &[&str]) -> Self {
        let message = format!("{:#}", error);
        let lowered = message.to_lowercase();

        if terminal_markers
            .iter()
            .any(|marker| !marker.is_empty() && lowered.contains(&marker.to_lowercase()))
        {
            Outcome::terminal(message)
        } else {
            Outcome::retryable(message)
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.detail_mut().token = Some(token.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail_mut().fields.insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self) -> &AttemptDetail {
        match self {
            Outcome::Success(d) | Outcome::TerminalFailure(d) | Outcome::RetryableFailure(d) => d,
        }
    }

    fn detail_mut(&mut self) -> &mut AttemptDetail {
        match self {
            Outcome::Success(d) | Outcome::TerminalFailure(d) | Outcome::RetryableFailure(d) => d,
        }
    }

    pub fn into_detail(self) -> AttemptDetail {
        match self {
            Outcome::Success(d) | Outcome::TerminalFailure(d) | Outcome::RetryableFailure(d) => d,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Outcome::TerminalFailure(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::RetryableFailure(_))
    }
}

/// The network operation a batch run executes once per entity.
///
/// `attempt` performs a single try and must classify every fault into an
/// [`Outcome`]; it never returns an error. The runner owns the retry loop.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Returns the name of the operation
    fn name(&self) -> &str;

    /// Eligibility pre-check. Ineligible entities are recorded as failed
    /// without calling `attempt`.
    fn is_eligible(&self, _entity: &Entity) -> bool {
        true
    }

    /// Run-level fields copied into the report (network, contract, ...).
    fn metadata(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Executes one attempt. `attempt` is 1-based.
    async fn attempt(&self, entity: &Entity, attempt: u32) -> Outcome;
}
