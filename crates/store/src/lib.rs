//! Key-state store backends
//!
//! This crate provides:
//! - `SledStore`: durable embedded store (sled), compare-and-set on every write
//! - `MemoryStore`: in-process store for single-node runs and tests

pub mod memory;
pub mod sled_store;

// Re-exports
pub use memory::MemoryStore;
pub use sled_store::SledStore;
