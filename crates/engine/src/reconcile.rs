//! Periodic stuck-lock reporter
//!
//! A record whose dispatch failed stays locked forever. This scanner only
//! finds and reports such records; unlocking is an explicit operator action
//! (`settle release`), never automatic.

use settle_core::{AccumulationRecord, Clock, KeyStateStore, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// A locked record idle past the staleness threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckLock {
    pub record: AccumulationRecord,
    pub idle: Duration,
}

pub struct StuckLockReporter {
    store: Arc<dyn KeyStateStore>,
    clock: Arc<dyn Clock>,

    /// Scan interval (default: 60 seconds)
    interval: Duration,

    /// Locked records idle longer than this are reported
    stale_after: Duration,
}

impl StuckLockReporter {
    pub fn new(
        store: Arc<dyn KeyStateStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            interval,
            stale_after,
        }
    }

    /// Run the reporting loop forever
    ///
    /// Spawn from daemon startup; scan failures are logged and retried on the
    /// next tick.
    pub async fn run(self) {
        let mut timer = interval(self.interval);

        info!(
            "Starting stuck-lock reporter (interval: {:?}, stale after: {:?})",
            self.interval, self.stale_after
        );

        loop {
            timer.tick().await;

            match self.scan().await {
                Ok(stuck) if stuck.is_empty() => {
                    debug!("Stuck-lock scan: none found");
                }
                Ok(stuck) => {
                    for lock in &stuck {
                        warn!(
                            key = %lock.record.key,
                            idle_secs = lock.idle.as_secs(),
                            arrivals = lock.record.arrivals,
                            "Record locked without dispatch; release it manually once the downstream is healthy"
                        );
                    }
                }
                Err(e) => {
                    warn!("Stuck-lock scan failed: {}", e);
                }
            }
        }
    }

    /// Find locked records idle for at least `stale_after`
    pub async fn scan(&self) -> StoreResult<Vec<StuckLock>> {
        let now_ms = self.clock.now_ms();
        let stuck = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| record.is_processing)
            .filter_map(|record| {
                let idle = record.idle_for(now_ms);
                (idle >= self.stale_after).then_some(StuckLock { record, idle })
            })
            .collect();
        Ok(stuck)
    }
}
