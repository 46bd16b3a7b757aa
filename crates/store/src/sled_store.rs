//! Durable key-state store using sled
//!
//! Every mutation is a sled `compare_and_swap` against the bytes that were
//! just read, so concurrent writers (producers appending, arbiters locking)
//! can never clobber each other. A failed swap means someone else wrote in
//! between; the operation re-reads and decides again.

use async_trait::async_trait;
use settle_core::{
    AccumulateOutcome, AccumulationRecord, CoordinationKey, KeyStateStore, StoreError, StoreResult,
};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, trace, warn};

/// Name of the sled tree holding accumulation records
const RECORDS_TREE: &str = "accumulation";

/// Retries before a compare-and-set loop gives up with `Contention`
const MAX_CAS_ATTEMPTS: u32 = 64;

/// Durable store backed by an embedded sled database
pub struct SledStore {
    /// Sled database
    db: Db,
    /// Records keyed by coordination key bytes
    records: Tree,
    #[cfg(test)]
    fail_flush: std::sync::atomic::AtomicBool,
}

impl SledStore {
    /// Open or create a store in the given directory
    pub fn open(path: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Unavailable(format!("create {}: {}", path.display(), e)))?;
        let db = sled::open(path.join("records.db")).map_err(unavailable)?;
        Self::from_db(db)
    }

    /// Open a throwaway store that is removed on drop
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(unavailable)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let records = db.open_tree(RECORDS_TREE).map_err(unavailable)?;
        debug!(records = records.len(), "Opened sled key-state store");
        Ok(Self {
            db,
            records,
            #[cfg(test)]
            fail_flush: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Number of present records
    pub fn count(&self) -> usize {
        self.records.len()
    }

    async fn flush(&self) -> StoreResult<()> {
        #[cfg(test)]
        if self.fail_flush.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable("flush failed".to_string()));
        }
        self.db.flush_async().await.map_err(unavailable)?;
        Ok(())
    }

    fn read(&self, key: &CoordinationKey) -> StoreResult<Option<(IVec, AccumulationRecord)>> {
        match self.records.get(key.as_bytes()).map_err(unavailable)? {
            Some(bytes) => {
                let record = AccumulationRecord::deserialize(key, &bytes)?;
                Ok(Some((bytes, record)))
            }
            None => Ok(None),
        }
    }

    /// Swap `expected` for `new`; `Ok(false)` when another writer got there first
    fn swap(
        &self,
        key: &CoordinationKey,
        expected: Option<&IVec>,
        new: &AccumulationRecord,
    ) -> StoreResult<bool> {
        let bytes = new.serialize()?;
        let result = self
            .records
            .compare_and_swap(key.as_bytes(), expected, Some(bytes))
            .map_err(unavailable)?;
        Ok(result.is_ok())
    }
}

#[async_trait]
impl KeyStateStore for SledStore {
    async fn get(&self, key: &CoordinationKey) -> StoreResult<Option<AccumulationRecord>> {
        Ok(self.read(key)?.map(|(_, record)| record))
    }

    async fn conditional_set_processing(
        &self,
        key: &CoordinationKey,
    ) -> StoreResult<Option<AccumulationRecord>> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (current, mut record) = match self.read(key)? {
                Some(found) => found,
                None => return Ok(None),
            };
            if record.is_processing {
                return Ok(None);
            }

            record.is_processing = true;
            if self.swap(key, Some(&current), &record)? {
                // The swap took the lock; the caller owns the dispatch either way
                if let Err(err) = self.flush().await {
                    warn!(key = %key, error = %err, "Lock taken but flush failed");
                }
                return Ok(Some(record));
            }
            // A producer appended (or someone locked/deleted) between read and swap
            trace!(key = %key, attempt, "Lock swap lost, re-reading");
        }

        Err(StoreError::Contention {
            key: key.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    async fn delete(&self, key: &CoordinationKey) -> StoreResult<()> {
        self.records.remove(key.as_bytes()).map_err(unavailable)?;
        self.flush().await
    }

    async fn accumulate(
        &self,
        key: &CoordinationKey,
        text: &str,
        at_ms: u64,
    ) -> StoreResult<AccumulateOutcome> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let outcome = match self.read(key)? {
                None => {
                    let record = AccumulationRecord::new(key.clone(), text, at_ms);
                    if !self.swap(key, None, &record)? {
                        trace!(key = %key, attempt, "Create swap lost, re-reading");
                        continue;
                    }
                    AccumulateOutcome::Created(record)
                }
                Some((_, record)) if record.is_processing => {
                    return Ok(AccumulateOutcome::Locked(record));
                }
                Some((current, mut record)) => {
                    record.append(text, at_ms);
                    if !self.swap(key, Some(&current), &record)? {
                        trace!(key = %key, attempt, "Append swap lost, re-reading");
                        continue;
                    }
                    AccumulateOutcome::Appended(record)
                }
            };

            self.flush().await?;
            return Ok(outcome);
        }

        Err(StoreError::Contention {
            key: key.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    async fn list(&self) -> StoreResult<Vec<AccumulationRecord>> {
        let mut records = Vec::with_capacity(self.records.len());
        for item in self.records.iter() {
            let (raw_key, value) = item.map_err(unavailable)?;
            let key_str = String::from_utf8(raw_key.to_vec()).map_err(|e| StoreError::Codec {
                key: format!("{:?}", raw_key),
                reason: e.to_string(),
            })?;
            let key = CoordinationKey::new(key_str.clone()).map_err(|e| StoreError::Codec {
                key: key_str,
                reason: e.to_string(),
            })?;
            records.push(AccumulationRecord::deserialize(&key, &value)?);
        }
        // sled iterates in byte order, which is key order
        Ok(records)
    }
}

fn unavailable(err: sled::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}
