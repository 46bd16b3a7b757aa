//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use settle_core::{Clock, CoordinationKey, DownstreamConfig, EngineConfig};
use settle_engine::{DispatchError, DispatchReceipt, DispatchRequest, Dispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use ulid::Ulid;

pub fn key(s: &str) -> CoordinationKey {
    CoordinationKey::new(s).unwrap()
}

pub fn engine_config(quiet_period: Duration) -> EngineConfig {
    let downstream = DownstreamConfig {
        base_url: Some("http://127.0.0.1:9".into()),
        credential: Some("test-secret".into()),
        timeout_ms: 5_000,
        ..Default::default()
    };
    EngineConfig::new(quiet_period, downstream).unwrap()
}

/// Milliseconds since test start, on tokio's pausable clock
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn start() -> Arc<Self> {
        Arc::new(Self {
            origin: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// One delivered batch, with the tokio time it arrived at
#[derive(Debug, Clone)]
pub struct Delivery {
    pub request: DispatchRequest,
    pub at: tokio::time::Instant,
}

/// Records every dispatch; optionally fails each one with a status
#[derive(Default)]
pub struct RecordingDispatcher {
    deliveries: Mutex<Vec<Delivery>>,
    fail_status: Option<u16>,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            fail_status: Some(status),
        })
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, DispatchError> {
        self.deliveries.lock().push(Delivery {
            request: request.clone(),
            at: tokio::time::Instant::now(),
        });
        match self.fail_status {
            Some(status) => Err(DispatchError::Status {
                status,
                body: "processor unavailable".to_string(),
            }),
            None => Ok(DispatchReceipt {
                dispatch_id: Ulid::new(),
                status: 200,
            }),
        }
    }
}

/// Blocks inside `dispatch` until the test opens the gate
pub struct GatedDispatcher {
    pub entered: Notify,
    gate: Semaphore,
    pub inner: Arc<RecordingDispatcher>,
}

impl GatedDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
            inner: RecordingDispatcher::new(),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl Dispatcher for GatedDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, DispatchError> {
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        self.inner.dispatch(request).await
    }
}
