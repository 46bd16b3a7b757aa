//! Accumulation record data structures

use crate::key::CoordinationKey;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Buffered state for one active coordination key
///
/// Producers append to `combined_payload` and refresh `last_arrival_ms`.
/// The arbiter flips `is_processing` once; the record is then deleted,
/// never reset in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulationRecord {
    /// Key this record belongs to
    pub key: CoordinationKey,
    /// Accumulated content, forwarded downstream as-is
    pub combined_payload: String,
    /// Most recent trigger (Unix milliseconds)
    pub last_arrival_ms: u64,
    /// Set by the arbiter's compare-and-set
    pub is_processing: bool,
    /// Record creation (Unix milliseconds)
    pub created_ms: u64,
    /// Number of producer appends folded into this record
    pub arrivals: u32,
}

/// Lifecycle position of a present record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Collecting arrivals, not yet claimed
    Accumulating,
    /// Claimed by an arbiter; deleted on successful dispatch
    Locked,
}

impl AccumulationRecord {
    /// Create a fresh record from a first arrival
    pub fn new(key: CoordinationKey, text: &str, at_ms: u64) -> Self {
        Self {
            key,
            combined_payload: text.to_string(),
            last_arrival_ms: at_ms,
            is_processing: false,
            created_ms: at_ms,
            arrivals: 1,
        }
    }

    /// Fold another arrival into the record
    ///
    /// Texts are joined with a single space. `last_arrival_ms` never moves
    /// backwards even if producers report out-of-order timestamps.
    pub fn append(&mut self, text: &str, at_ms: u64) {
        if !text.is_empty() {
            if !self.combined_payload.is_empty() {
                self.combined_payload.push(' ');
            }
            self.combined_payload.push_str(text);
        }
        self.last_arrival_ms = self.last_arrival_ms.max(at_ms);
        self.arrivals = self.arrivals.saturating_add(1);
    }

    pub fn state(&self) -> RecordState {
        if self.is_processing {
            RecordState::Locked
        } else {
            RecordState::Accumulating
        }
    }

    /// Time since the last arrival, saturating at zero for clock skew
    pub fn idle_for(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.last_arrival_ms))
    }

    /// Serialize for storage
    pub fn serialize(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(self).map_err(|e| StoreError::Codec {
            key: self.key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Deserialize from storage
    pub fn deserialize(key: &CoordinationKey, bytes: &[u8]) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Accumulating => f.pad("accumulating"),
            RecordState::Locked => f.pad("locked"),
        }
    }
}
