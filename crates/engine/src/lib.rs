//! Debounce coordination engine
//!
//! This crate turns bursts of trigger events into one downstream dispatch:
//! - Per-key debouncing (one delayed evaluation per trigger, never cancelled)
//! - Single-winner arbitration via the store's compare-and-set
//! - Exactly-once dispatch with record deletion on success
//! - Stuck-lock reporting for failed dispatches

pub mod arbiter;
pub mod auth;
pub mod coordinator;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod reconcile;

pub use arbiter::{Arbiter, Evaluation};
pub use auth::{verify_bearer, AuthError};
pub use coordinator::{Coordinator, EnqueueOutcome};
pub use debounce::{DebounceScheduler, ScheduledEvaluation};
pub use dispatch::{
    DispatchCoordinator, DispatchError, DispatchReceipt, DispatchRequest, Dispatcher, HttpDispatcher,
    DISPATCH_ID_HEADER,
};
pub use error::EngineError;
pub use reconcile::{StuckLock, StuckLockReporter};
