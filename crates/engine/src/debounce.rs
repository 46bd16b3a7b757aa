//! Per-key debouncing
//!
//! Every trigger spawns its own delayed evaluation. Earlier timers are never
//! cancelled; when they fire they see a newer `last_arrival_ms` in the store
//! and step aside. This keeps working across restarts and across processes,
//! since no timer handle has to be shared.

use settle_core::CoordinationKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::arbiter::{Arbiter, Evaluation};
use crate::error::EngineError;

/// Schedules one delayed arbiter evaluation per trigger
#[derive(Clone)]
pub struct DebounceScheduler {
    arbiter: Arc<Arbiter>,
}

/// Handle to a pending evaluation
///
/// Dropping it detaches the evaluation; it still runs to completion and logs
/// its own outcome.
pub struct ScheduledEvaluation {
    key: CoordinationKey,
    handle: JoinHandle<Result<Evaluation, EngineError>>,
}

impl DebounceScheduler {
    pub fn new(arbiter: Arc<Arbiter>) -> Self {
        Self { arbiter }
    }

    pub fn delay(&self) -> Duration {
        self.arbiter.quiet_period()
    }

    /// Start a delayed evaluation for `key`
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, key: CoordinationKey) -> ScheduledEvaluation {
        let arbiter = Arc::clone(&self.arbiter);
        let delay = self.delay();
        let task_key = key.clone();

        debug!(key = %key, delay_ms = delay.as_millis() as u64, "Evaluation scheduled");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = arbiter.evaluate(&task_key).await;
            log_outcome(&task_key, &result);
            result
        });

        ScheduledEvaluation { key, handle }
    }
}

impl ScheduledEvaluation {
    pub fn key(&self) -> &CoordinationKey {
        &self.key
    }

    /// Wait for the evaluation to finish
    pub async fn wait(self) -> Result<Evaluation, EngineError> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => Err(EngineError::Aborted {
                key: self.key,
                reason: join_err.to_string(),
            }),
        }
    }
}

fn log_outcome(key: &CoordinationKey, result: &Result<Evaluation, EngineError>) {
    match result {
        Ok(Evaluation::Dispatched { dispatch_id, arrivals }) => {
            info!(key = %key, dispatch_id = %dispatch_id, arrivals, "Evaluation dispatched batch");
        }
        Ok(other) => {
            debug!(key = %key, outcome = other.label(), "Evaluation finished without dispatch");
        }
        Err(e) => {
            error!(key = %key, error = %e, "Evaluation failed");
        }
    }
}
