//! # Core Logic - Batch Orchestration for Testnet Operations
//!
//! This crate runs one network operation (a claim transaction, a faucet
//! request, ...) across many accounts with bounded concurrency, per-account
//! retries and an aggregated JSON report.
//!
//! ## Modules
//!
//! - [`aggregator`] - Thread-safe per-entity result collection
//! - [`config`] - Batch and proxy configuration structures
//! - [`error`] - Typed error handling with thiserror
//! - [`report`] - Run report and atomic report writer
//! - [`traits`] - Entity, Outcome and the Operation trait
//! - `utils` - Worker pool, retry policy, key loading, proxies, logging

// Module declarations - internal modules marked pub(crate)
pub mod aggregator;
pub mod config;
pub mod error;
pub mod report;
pub mod traits;
pub(crate) mod utils;

// Selective exports - only public API types
pub use aggregator::{AggregateCounts, EntityResult, EntityStatus, ResultAggregator};
pub use config::{BatchConfig, ProxyConfig};
pub use error::{ConfigError, NetworkError, ReportError, WalletError};
pub use report::{ReportWriter, RunReport};
pub use traits::{AttemptDetail, Entity, Operation, Outcome};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{setup_logger, BatchRunner, LoadedKeys, ProxyManager, WalletManager};

pub use utils::retry::{with_retry, RetryDecision, RetryPolicy};
pub use utils::runner::{CANCELLED_REASON, INELIGIBLE_REASON};
