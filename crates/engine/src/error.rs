//! Engine error taxonomy
//!
//! Benign race losses are not errors; they are `Evaluation` variants.
//! Everything here needs someone's attention.

use crate::dispatch::DispatchError;
use settle_core::{ConfigError, CoordinationKey, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or invalid settings; raised before any store mutation
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store unreachable or failing; retryable
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Downstream rejected or never answered; the record stays locked
    #[error("dispatch failed for key '{key}': {source}")]
    Dispatch {
        key: CoordinationKey,
        #[source]
        source: DispatchError,
    },

    /// HTTP client could not be built
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Scheduled evaluation panicked or was cancelled
    #[error("evaluation for key '{key}' aborted: {reason}")]
    Aborted { key: CoordinationKey, reason: String },
}

impl EngineError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
