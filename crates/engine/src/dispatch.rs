//! Dispatch coordinator
//!
//! Sends a locked batch downstream exactly once. On success the record is
//! deleted so the next arrival starts a new cycle. On any failure the record
//! is left locked: a blind retry could deliver the same batch twice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use settle_core::{CoordinationKey, DownstreamConfig, KeyStateStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use ulid::Ulid;

use crate::error::EngineError;

/// Header carrying the per-dispatch id
pub const DISPATCH_ID_HEADER: &str = "X-Dispatch-Id";

/// Longest downstream error body kept in a `DispatchError`
const MAX_ERROR_BODY: usize = 512;

/// Body posted to the downstream processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub key: CoordinationKey,
    pub payload: String,
}

/// Acknowledgement of a successful dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub dispatch_id: Ulid,
    pub status: u16,
}

/// Why a downstream call did not succeed
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("downstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("downstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Something that can deliver a batch to the downstream processor
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, DispatchError>;
}

/// Posts batches as JSON with a bearer credential
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
    timeout: Duration,
}

impl HttpDispatcher {
    /// Build from downstream settings; fails if address or credential is missing
    pub fn new(config: &DownstreamConfig) -> Result<Self, EngineError> {
        let endpoint = config.endpoint()?;
        let credential = config.credential()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("settle/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            credential,
            timeout: config.timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, err: reqwest::Error) -> DispatchError {
        if err.is_timeout() {
            DispatchError::Timeout(self.timeout)
        } else {
            DispatchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, DispatchError> {
        let dispatch_id = Ulid::new();

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.credential)
            .header(DISPATCH_ID_HEADER, dispatch_id.to_string())
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(DispatchReceipt {
            dispatch_id,
            status: status.as_u16(),
        })
    }
}

/// Invokes the dispatcher for a winning evaluation and retires the record
pub struct DispatchCoordinator {
    store: Arc<dyn KeyStateStore>,
    dispatcher: Arc<dyn Dispatcher>,
    timeout: Duration,
}

impl DispatchCoordinator {
    pub fn new(
        store: Arc<dyn KeyStateStore>,
        dispatcher: Arc<dyn Dispatcher>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            timeout,
        }
    }

    /// Deliver `payload` for `key`; delete the record only on success
    pub async fn dispatch(
        &self,
        key: &CoordinationKey,
        payload: &str,
    ) -> Result<DispatchReceipt, EngineError> {
        let request = DispatchRequest {
            key: key.clone(),
            payload: payload.to_string(),
        };

        info!(key = %key, bytes = payload.len(), "Dispatching coalesced batch");

        let result = match tokio::time::timeout(self.timeout, self.dispatcher.dispatch(&request)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        };

        match result {
            Ok(receipt) => {
                // A failed delete leaves the record locked, never re-sent
                self.store.delete(key).await?;
                info!(
                    key = %key,
                    dispatch_id = %receipt.dispatch_id,
                    status = receipt.status,
                    "Batch dispatched, record cleared"
                );
                Ok(receipt)
            }
            Err(source) => {
                error!(key = %key, error = %source, "Dispatch failed, record left locked");
                Err(EngineError::Dispatch {
                    key: key.clone(),
                    source,
                })
            }
        }
    }
}
