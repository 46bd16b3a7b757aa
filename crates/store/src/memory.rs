//! In-process key-state store
//!
//! Compare-and-set is provided by DashMap's per-shard write lock: the
//! check of `is_processing` and the flip happen under one `get_mut` guard.
//! Only suitable when every evaluator lives in the same process.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use settle_core::{
    AccumulateOutcome, AccumulationRecord, CoordinationKey, KeyStateStore, StoreError, StoreResult,
};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<CoordinationKey, AccumulationRecord>,
    /// Simulated outage switch for exercising error paths
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a record verbatim (fixtures, imports)
    pub fn insert(&self, record: AccumulationRecord) {
        self.records.insert(record.key.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStateStore for MemoryStore {
    async fn get(&self, key: &CoordinationKey) -> StoreResult<Option<AccumulationRecord>> {
        self.check()?;
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn conditional_set_processing(
        &self,
        key: &CoordinationKey,
    ) -> StoreResult<Option<AccumulationRecord>> {
        self.check()?;
        let Some(mut record) = self.records.get_mut(key) else {
            return Ok(None);
        };
        if record.is_processing {
            return Ok(None);
        }
        record.is_processing = true;
        Ok(Some(record.clone()))
    }

    async fn delete(&self, key: &CoordinationKey) -> StoreResult<()> {
        self.check()?;
        self.records.remove(key);
        Ok(())
    }

    async fn accumulate(
        &self,
        key: &CoordinationKey,
        text: &str,
        at_ms: u64,
    ) -> StoreResult<AccumulateOutcome> {
        self.check()?;
        match self.records.entry(key.clone()) {
            Entry::Vacant(slot) => {
                let record = AccumulationRecord::new(key.clone(), text, at_ms);
                slot.insert(record.clone());
                Ok(AccumulateOutcome::Created(record))
            }
            Entry::Occupied(slot) if slot.get().is_processing => {
                Ok(AccumulateOutcome::Locked(slot.get().clone()))
            }
            Entry::Occupied(mut slot) => {
                slot.get_mut().append(text, at_ms);
                Ok(AccumulateOutcome::Appended(slot.get().clone()))
            }
        }
    }

    async fn list(&self) -> StoreResult<Vec<AccumulationRecord>> {
        self.check()?;
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }
}
