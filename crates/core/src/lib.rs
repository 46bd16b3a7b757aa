//! Settle Core - shared types for the debounce coordination engine
//!
//! This crate provides the foundational pieces every other crate builds on:
//! - Coordination keys and accumulation records
//! - The `KeyStateStore` contract (get / compare-and-set / delete)
//! - Clock abstraction for freshness checks
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod key;
pub mod record;
pub mod store;

// Re-export main types for convenience
pub use clock::{unix_now_ms, Clock, SystemClock};
pub use config::{ConfigError, DownstreamConfig, EngineConfig, SettleConfig};
pub use key::{CoordinationKey, KeyError};
pub use record::{AccumulationRecord, RecordState};
pub use store::{AccumulateOutcome, KeyStateStore, StoreError, StoreResult};
