//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ErrorResponse, PhaseResponse, ReplyResponse, SaveResponse, StreamQuery, StreamResponse,
    ThreadResponse,
};
use super::AppState;
use crate::exchange::{ExchangeError, TransitionError};
use crate::snapshot::SnapshotError;
use crate::thread::{normalize_role, MessageInput, Role};
use axum::{
    body::Body,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use futures::TryStreamExt;
use std::io;
use tokio_util::io::StreamReader;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/thread", get(get_thread).delete(delete_thread))
        // Streaming ingestion and incremental control
        .route("/api/thread/stream", post(stream_message))
        .route("/api/thread/finish", post(finish_message))
        // Wholesale updates
        .route("/api/thread/last", put(replace_last))
        .route("/api/thread/messages", post(append_message))
        // Reads
        .route("/api/thread/current", get(get_current_text))
        .route("/api/thread/last-reply", get(get_last_reply))
        .route("/api/thread/validated-reply", get(get_validated_reply))
        .route("/api/thread/events", get(thread_events))
        // Upstream and persistence
        .route("/api/thread/reply", post(request_reply))
        .route("/api/thread/save", post(save_thread))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Reads
// ============================================================

async fn get_thread(State(state): State<AppState>) -> Json<ThreadResponse> {
    let snapshot = state.exchange.store().snapshot();
    Json(ThreadResponse {
        version: snapshot.version,
        phase: state.exchange.phase(),
        messages: snapshot.messages,
    })
}

/// Live text of the message being streamed; empty when nothing is streaming
async fn get_current_text(State(state): State<AppState>) -> Json<ReplyResponse> {
    Json(ReplyResponse {
        content: state.builder.current_text().unwrap_or_default(),
    })
}

async fn get_last_reply(State(state): State<AppState>) -> Json<ReplyResponse> {
    Json(ReplyResponse::from_message(
        state.exchange.store().last_reply(),
    ))
}

async fn get_validated_reply(State(state): State<AppState>) -> Json<ReplyResponse> {
    Json(ReplyResponse::from_message(
        state.exchange.store().validated_reply(),
    ))
}

async fn thread_events(State(state): State<AppState>) -> impl IntoResponse {
    let events = state.exchange.store().subscribe();
    let snapshot = state.exchange.store().snapshot();
    sse_stream(snapshot, state.exchange.phase(), events)
}

// ============================================================
// Streaming
// ============================================================

/// Tokenize the raw request body into a new message; end of body finishes it
async fn stream_message(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    body: Body,
) -> Result<Json<StreamResponse>, AppError> {
    let role = normalize_role(&query.role).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let summary = state
        .builder
        .ingest(role, reader, state.tokenizer.clone())
        .await?;

    Ok(Json(StreamResponse {
        tokens: summary.tokens,
        phase: summary.phase,
    }))
}

/// Close a message whose stream broke off
async fn finish_message(State(state): State<AppState>) -> Result<Json<PhaseResponse>, AppError> {
    let phase = state.builder.finish()?;
    Ok(Json(PhaseResponse { phase }))
}

// ============================================================
// Wholesale updates
// ============================================================

async fn replace_last(
    State(state): State<AppState>,
    Json(input): Json<MessageInput>,
) -> Result<Json<PhaseResponse>, AppError> {
    let message = input
        .into_message()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let phase = state.builder.replace(message)?;
    Ok(Json(PhaseResponse { phase }))
}

async fn append_message(
    State(state): State<AppState>,
    Json(input): Json<MessageInput>,
) -> Result<Json<PhaseResponse>, AppError> {
    let message = input
        .into_message()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let phase = state.exchange.append(message)?;
    Ok(Json(PhaseResponse { phase }))
}

async fn delete_thread(State(state): State<AppState>) -> Result<Json<PhaseResponse>, AppError> {
    let phase = state.exchange.delete_all()?;
    Ok(Json(PhaseResponse { phase }))
}

// ============================================================
// Upstream and persistence
// ============================================================

/// Ask the upstream service for a responder message built from the thread
async fn request_reply(State(state): State<AppState>) -> Result<Json<StreamResponse>, AppError> {
    let upstream = state
        .upstream
        .clone()
        .ok_or_else(|| AppError::BadRequest("No upstream reply service configured".to_string()))?;

    if state.exchange.phase().is_streaming() {
        return Err(TransitionError::AlreadyStreaming.into());
    }

    let history = state.exchange.store().snapshot().messages;
    let lines = upstream
        .stream_reply(&history)
        .await
        .map_err(ExchangeError::from)?;
    let summary = state.builder.relay(Role::Responder, lines).await?;

    Ok(Json(StreamResponse {
        tokens: summary.tokens,
        phase: summary.phase,
    }))
}

async fn save_thread(State(state): State<AppState>) -> Result<Json<SaveResponse>, AppError> {
    // A half-streamed message has no persisted form
    if state.exchange.phase().is_streaming() {
        return Err(AppError::Conflict(
            "Cannot save while a message is streaming".to_string(),
        ));
    }

    let messages = state.exchange.store().snapshot().messages;
    let mut baseline = state.baseline.hold().await;
    let written = state.snapshots.save(&messages).await?;
    baseline.acknowledge(written);
    drop(baseline);
    tracing::info!(count = messages.len(), "Thread saved");
    Ok(Json(SaveResponse {
        saved: messages.len(),
    }))
}

async fn get_version() -> &'static str {
    concat!("turnstream ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl From<ExchangeError> for AppError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::Transition(_) | ExchangeError::Store(_) => {
                AppError::Conflict(e.to_string())
            }
            ExchangeError::Transport(_) => AppError::BadRequest(e.to_string()),
            ExchangeError::Upstream(ref upstream) => {
                tracing::warn!(kind = ?upstream.kind, error = %upstream, "Upstream reply failed");
                AppError::BadGateway(e.to_string())
            }
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        ExchangeError::from(e).into()
    }
}

impl From<SnapshotError> for AppError {
    fn from(e: SnapshotError) -> Self {
        tracing::error!(error = %e, "Snapshot operation failed");
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
