//! # Core Error Types
//!
//! Centralized error definitions for the core-logic crate.
//!
//! Per-entity failures never surface here: operation adapters fold them into
//! an [`Outcome`](crate::traits::Outcome). These types cover the run-level
//! conditions a caller may need to abort on, and the network faults adapters
//! classify.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid RPC URL format: '{url}'")]
    InvalidRpcUrl { url: String },

    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },
}

/// Key material errors, reported per entry while loading the key file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Key file not found: {path}")]
    FileNotFound { path: String },

    #[error("Unreadable key file '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Invalid private key format: expected hex string")]
    InvalidKeyFormat,

    #[error("Invalid private key length: expected 64 hex chars, got {length}")]
    InvalidKeyLength { length: usize },

    #[error("Could not derive address: {reason}")]
    DerivationFailed { reason: String },
}

/// Network and RPC-related errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("Connection refused to {endpoint}: {reason}")]
    ConnectionRefused { endpoint: String, reason: String },

    #[error("HTTP error {status_code} from {endpoint}")]
    HttpError { status_code: u16, endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Report persistence errors. Any of these is fatal for the run.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
