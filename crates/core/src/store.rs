//! Key-state store contract
//!
//! The engine never holds coordination state in memory. Everything it needs
//! to decide (freshness, lock ownership) is re-read from a `KeyStateStore`,
//! which must be safe to share between many processes.

use crate::key::CoordinationKey;
use crate::record::AccumulationRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Store failures
///
/// None of these mean "lost the race"; absent records and failed
/// compare-and-set attempts are reported through `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or I/O failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes could not be decoded (or a record could not be encoded)
    #[error("record codec error for key '{key}': {reason}")]
    Codec { key: String, reason: String },

    /// Compare-and-set kept failing because of concurrent writers
    #[error("contention on key '{key}' after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
}

impl StoreError {
    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Contention { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a producer append
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccumulateOutcome {
    /// First arrival for the key; a new cycle started
    Created(AccumulationRecord),
    /// Folded into an accumulating record
    Appended(AccumulationRecord),
    /// Record is claimed by a dispatch in flight (or stuck); nothing written
    Locked(AccumulationRecord),
}

impl AccumulateOutcome {
    /// Whether the text was written
    pub fn accepted(&self) -> bool {
        !matches!(self, AccumulateOutcome::Locked(_))
    }

    pub fn record(&self) -> &AccumulationRecord {
        match self {
            AccumulateOutcome::Created(r)
            | AccumulateOutcome::Appended(r)
            | AccumulateOutcome::Locked(r) => r,
        }
    }
}

/// Durable per-key state shared by producers and evaluators
#[async_trait]
pub trait KeyStateStore: Send + Sync {
    /// Read the record for `key`
    async fn get(&self, key: &CoordinationKey) -> StoreResult<Option<AccumulationRecord>>;

    /// Atomically set `is_processing = true` if it is currently false
    ///
    /// Returns the updated record only when this call performed the
    /// transition. Returns `None` when the record is absent or already locked.
    async fn conditional_set_processing(
        &self,
        key: &CoordinationKey,
    ) -> StoreResult<Option<AccumulationRecord>>;

    /// Remove the record, closing the cycle (no-op when absent)
    async fn delete(&self, key: &CoordinationKey) -> StoreResult<()>;

    /// Producer side: append `text` and refresh the arrival timestamp
    ///
    /// Creates the record when absent. Locked records are left untouched.
    async fn accumulate(
        &self,
        key: &CoordinationKey,
        text: &str,
        at_ms: u64,
    ) -> StoreResult<AccumulateOutcome>;

    /// All present records, ordered by key
    async fn list(&self) -> StoreResult<Vec<AccumulationRecord>>;
}
