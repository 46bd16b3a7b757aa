//! HTTP intake: trigger and enqueue endpoints in front of the coordinator

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use settle_core::{CoordinationKey, SettleConfig};
use settle_engine::{
    verify_bearer, AuthError, Coordinator, EngineError, EnqueueOutcome, Evaluation, ScheduledEvaluation,
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<Coordinator>,

    /// Hold responses until the scheduled evaluation finishes
    wait_for_evaluation: bool,

    /// Intake bearer secret; `None` leaves the endpoints open
    intake_credential: Option<Arc<str>>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, config: &SettleConfig) -> Self {
        Self {
            coordinator,
            wait_for_evaluation: config.engine.wait_for_evaluation,
            intake_credential: config.server.credential().map(Arc::from),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> ApiResult<()> {
        let Some(expected) = self.intake_credential.as_deref() else {
            return Ok(());
        };
        let header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
        verify_bearer(header, Some(expected)).map_err(ApiError::Auth)
    }

    async fn respond(
        &self,
        key: CoordinationKey,
        evaluation: ScheduledEvaluation,
        pending_arrivals: Option<u32>,
    ) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
        let quiet_period_ms = self.coordinator.quiet_period().as_millis() as u64;

        if !self.wait_for_evaluation {
            // Detached; the evaluation logs its own outcome
            drop(evaluation);
            return Ok((
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    key: key.to_string(),
                    status: "scheduled",
                    dispatch_id: None,
                    arrivals: pending_arrivals,
                    quiet_period_ms,
                }),
            ));
        }

        let outcome = evaluation.wait().await?;
        let (dispatch_id, arrivals) = match &outcome {
            Evaluation::Dispatched { dispatch_id, arrivals } => (Some(dispatch_id.to_string()), Some(*arrivals)),
            _ => (None, pending_arrivals),
        };
        Ok((
            StatusCode::OK,
            Json(TriggerResponse {
                key: key.to_string(),
                status: outcome.label(),
                dispatch_id,
                arrivals,
                quiet_period_ms,
            }),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub key: String,
    /// `scheduled`, or the evaluation outcome when responses wait for it
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrivals: Option<u32>,
    pub quiet_period_ms: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    quiet_period_ms: u64,
}

/// Errors surfaced to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Auth(AuthError),
    #[error("batch for key '{0}' is being dispatched; retry later")]
    Locked(CoordinationKey),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Auth(AuthError::NotConfigured) => (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_NOT_CONFIGURED"),
            ApiError::Auth(AuthError::Missing) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Auth(AuthError::Forbidden) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Locked(_) => (StatusCode::CONFLICT, "LOCKED"),
            ApiError::Engine(EngineError::Store(_)) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
            ApiError::Engine(EngineError::Dispatch { .. }) => (StatusCode::BAD_GATEWAY, "DISPATCH_FAILED"),
            ApiError::Engine(EngineError::Config(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            ApiError::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Build the intake router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trigger", post(trigger))
        .route("/enqueue", post(enqueue))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        quiet_period_ms: state.coordinator.quiet_period().as_millis() as u64,
    })
}

async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    state.authorize(&headers)?;
    let Json(body) = body?;
    let key = parse_key(&body.key)?;

    debug!(key = %key, "Trigger received");
    let evaluation = state.coordinator.trigger(key.clone());
    state.respond(key, evaluation, None).await
}

async fn enqueue(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    state.authorize(&headers)?;
    let Json(body) = body?;
    let key = parse_key(&body.key)?;

    match state.coordinator.enqueue(key.clone(), &body.text).await? {
        EnqueueOutcome::Locked(_) => Err(ApiError::Locked(key)),
        EnqueueOutcome::Scheduled { record, evaluation } => {
            state.respond(key, evaluation, Some(record.arrivals)).await
        }
    }
}

fn parse_key(raw: &str) -> ApiResult<CoordinationKey> {
    CoordinationKey::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}
