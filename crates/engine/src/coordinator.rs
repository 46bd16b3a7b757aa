//! Engine facade wiring store, clock, arbiter and scheduler together

use settle_core::{
    AccumulateOutcome, AccumulationRecord, Clock, CoordinationKey, EngineConfig, KeyStateStore,
    SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::arbiter::{Arbiter, Evaluation};
use crate::debounce::{DebounceScheduler, ScheduledEvaluation};
use crate::dispatch::{DispatchCoordinator, Dispatcher, HttpDispatcher};
use crate::error::EngineError;

/// Result of a producer arrival
pub enum EnqueueOutcome {
    /// Text stored and an evaluation scheduled
    Scheduled {
        record: AccumulationRecord,
        evaluation: ScheduledEvaluation,
    },
    /// The key's batch is locked; nothing stored, nothing scheduled
    Locked(AccumulationRecord),
}

pub struct Coordinator {
    store: Arc<dyn KeyStateStore>,
    clock: Arc<dyn Clock>,
    arbiter: Arc<Arbiter>,
    scheduler: DebounceScheduler,
}

impl Coordinator {
    /// Production wiring: HTTP dispatcher and wall clock
    pub fn new(config: &EngineConfig, store: Arc<dyn KeyStateStore>) -> Result<Self, EngineError> {
        let dispatcher = Arc::new(HttpDispatcher::new(&config.downstream)?);
        info!(
            endpoint = dispatcher.endpoint(),
            quiet_period_ms = config.quiet_period.as_millis() as u64,
            "Coordinator ready"
        );
        Ok(Self::with_parts(config, store, dispatcher, Arc::new(SystemClock)))
    }

    /// Wire with explicit collaborators
    pub fn with_parts(
        config: &EngineConfig,
        store: Arc<dyn KeyStateStore>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dispatch = DispatchCoordinator::new(Arc::clone(&store), dispatcher, config.downstream.timeout());
        let arbiter = Arc::new(Arbiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.quiet_period,
            dispatch,
        ));
        let scheduler = DebounceScheduler::new(Arc::clone(&arbiter));

        Self {
            store,
            clock,
            arbiter,
            scheduler,
        }
    }

    /// Trigger event: schedule one evaluation for `key` after the quiet period
    pub fn trigger(&self, key: CoordinationKey) -> ScheduledEvaluation {
        self.scheduler.schedule(key)
    }

    /// Producer arrival: append `text` to the key's batch, then trigger
    pub async fn enqueue(&self, key: CoordinationKey, text: &str) -> Result<EnqueueOutcome, EngineError> {
        let now_ms = self.clock.now_ms();
        match self.store.accumulate(&key, text, now_ms).await? {
            AccumulateOutcome::Locked(record) => {
                warn!(key = %key, "Arrival refused, batch is locked");
                Ok(EnqueueOutcome::Locked(record))
            }
            AccumulateOutcome::Created(record) | AccumulateOutcome::Appended(record) => {
                let evaluation = self.trigger(key);
                Ok(EnqueueOutcome::Scheduled { record, evaluation })
            }
        }
    }

    /// Schedule an evaluation for every unlocked record in the store
    ///
    /// Called at startup: timers from a previous process are gone, but their
    /// records are not. Locked records are skipped.
    pub async fn resume_pending(&self) -> Result<Vec<ScheduledEvaluation>, EngineError> {
        let pending: Vec<_> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| !record.is_processing)
            .map(|record| self.trigger(record.key))
            .collect();
        if !pending.is_empty() {
            info!(count = pending.len(), "Resumed pending batches");
        }
        Ok(pending)
    }

    /// Run an evaluation immediately, skipping the scheduler delay
    pub async fn evaluate(&self, key: &CoordinationKey) -> Result<Evaluation, EngineError> {
        self.arbiter.evaluate(key).await
    }

    pub fn quiet_period(&self) -> Duration {
        self.arbiter.quiet_period()
    }
}
