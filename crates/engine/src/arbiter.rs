//! Single-winner arbiter
//!
//! Runs once per scheduled evaluation. Two checks, both against the store:
//! 1. freshness: a newer arrival means a later evaluation owns the batch
//! 2. compare-and-set on `is_processing`: only one evaluator gets past it
//!
//! Losing either check is a normal outcome, not an error.

use settle_core::{Clock, CoordinationKey, KeyStateStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use ulid::Ulid;

use crate::dispatch::DispatchCoordinator;
use crate::error::EngineError;

/// How one evaluation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// No record: another evaluation already finished the cycle
    Absent,
    /// A newer arrival reset the quiet period
    Superseded { idle: Duration },
    /// Another evaluator holds the lock
    LockLost,
    /// This evaluation won and the batch was delivered
    Dispatched { dispatch_id: Ulid, arrivals: u32 },
}

impl Evaluation {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Evaluation::Dispatched { .. })
    }

    /// Short label for logs and HTTP responses
    pub fn label(&self) -> &'static str {
        match self {
            Evaluation::Absent => "absent",
            Evaluation::Superseded { .. } => "superseded",
            Evaluation::LockLost => "lock_lost",
            Evaluation::Dispatched { .. } => "dispatched",
        }
    }
}

pub struct Arbiter {
    store: Arc<dyn KeyStateStore>,
    clock: Arc<dyn Clock>,
    quiet_period: Duration,
    dispatch: DispatchCoordinator,
}

impl Arbiter {
    pub fn new(
        store: Arc<dyn KeyStateStore>,
        clock: Arc<dyn Clock>,
        quiet_period: Duration,
        dispatch: DispatchCoordinator,
    ) -> Self {
        Self {
            store,
            clock,
            quiet_period,
            dispatch,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Decide whether this evaluation dispatches the batch for `key`
    pub async fn evaluate(&self, key: &CoordinationKey) -> Result<Evaluation, EngineError> {
        let Some(record) = self.store.get(key).await? else {
            debug!(key = %key, "No record, cycle already closed");
            return Ok(Evaluation::Absent);
        };

        let idle = record.idle_for(self.clock.now_ms());
        if idle < self.quiet_period {
            debug!(key = %key, idle_ms = idle.as_millis() as u64, "Newer arrival, evaluation superseded");
            return Ok(Evaluation::Superseded { idle });
        }

        let Some(locked) = self.store.conditional_set_processing(key).await? else {
            debug!(key = %key, "Lock held elsewhere");
            return Ok(Evaluation::LockLost);
        };

        let receipt = self.dispatch.dispatch(key, &locked.combined_payload).await?;
        Ok(Evaluation::Dispatched {
            dispatch_id: receipt.dispatch_id,
            arrivals: locked.arrivals,
        })
    }
}
