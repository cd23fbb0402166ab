//! HTTP routes for the monitor service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::anchor::{ThreadAnchor, ThreadMessage};
use crate::monitor::{CycleReport, LoopState};
use crate::recipients::RecipientId;
use crate::risk::ScoredObject;
use crate::WatchState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub loop_state: LoopState,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub tracked_identities: usize,
    pub recipients: usize,
    pub last_cycle: Option<CycleReport>,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub objects: Vec<ScoredObject>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct AnchorsResponse {
    pub anchors: Vec<ThreadAnchor>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub identity: String,
    pub messages: Vec<ThreadMessage>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRecipientRequest {
    pub chat_id: RecipientId,
}

#[derive(Debug, Serialize)]
pub struct RegisterRecipientResponse {
    pub registered: bool,
    pub total: usize,
}

fn status_of(err: impl Into<cosmic_common::Error>) -> StatusCode {
    let err = err.into();
    tracing::warn!(error = %err, "Request failed");
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Feed identities are short alphanumeric tokens.
fn validate_identity(identity: &str) -> Result<(), StatusCode> {
    let valid = !identity.is_empty()
        && identity.len() <= 64
        && identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(status_of(cosmic_common::Error::InvalidInput(format!(
            "invalid identity: {}",
            cosmic_common::util::truncate_with_ellipsis(identity, 32)
        ))))
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "cosmic-watch".to_string(),
    })
}

/// Loop state and the last cycle summary
pub async fn get_status(State(state): State<Arc<WatchState>>) -> Json<StatusResponse> {
    let snapshot = state.engine.snapshot().await;

    Json(StatusResponse {
        loop_state: state.monitor.get_state().await,
        cycles_completed: snapshot.cycles_completed,
        cycles_failed: snapshot.cycles_failed,
        tracked_identities: snapshot.tracked_identities,
        recipients: state.engine.recipients().len().await,
        last_cycle: snapshot.last_report,
        last_error: snapshot.last_error,
    })
}

/// Run one cycle now, waiting for any cycle in flight
pub async fn run_cycle(
    State(state): State<Arc<WatchState>>,
) -> Result<Json<CycleReport>, StatusCode> {
    tracing::info!("Manual cycle requested");
    state.engine.run_cycle_once().await.map(Json).map_err(status_of)
}

/// Scored feed from the last successful cycle
pub async fn get_feed(State(state): State<Arc<WatchState>>) -> Json<FeedResponse> {
    let objects = state.engine.latest_feed().await;
    let count = objects.len();
    Json(FeedResponse { objects, count })
}

/// All thread anchors, newest first
pub async fn list_anchors(
    State(state): State<Arc<WatchState>>,
) -> Result<Json<AnchorsResponse>, StatusCode> {
    let anchors = state.engine.list_anchors().await.map_err(status_of)?;
    let count = anchors.len();
    Ok(Json(AnchorsResponse { anchors, count }))
}

/// Delete an anchor and its thread log
pub async fn delete_anchor(
    State(state): State<Arc<WatchState>>,
    Path(identity): Path<String>,
) -> Result<StatusCode, StatusCode> {
    validate_identity(&identity)?;

    if state.engine.delete_anchor(&identity).await.map_err(status_of)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(status_of(cosmic_common::Error::NotFound(format!("anchor {identity}"))))
    }
}

/// Discussion messages recorded for an anchor
pub async fn get_anchor_messages(
    State(state): State<Arc<WatchState>>,
    Path(identity): Path<String>,
) -> Result<Json<MessagesResponse>, StatusCode> {
    validate_identity(&identity)?;

    let messages = state
        .engine
        .thread_messages(&identity)
        .await
        .map_err(status_of)?
        .ok_or_else(|| status_of(cosmic_common::Error::NotFound(format!("thread {identity}"))))?;
    let count = messages.len();

    Ok(Json(MessagesResponse {
        identity,
        messages,
        count,
    }))
}

/// Register an alert recipient explicitly
pub async fn register_recipient(
    State(state): State<Arc<WatchState>>,
    Json(request): Json<RegisterRecipientRequest>,
) -> Json<RegisterRecipientResponse> {
    let registered = state.engine.register_recipient(request.chat_id).await;
    Json(RegisterRecipientResponse {
        registered,
        total: state.engine.recipients().len().await,
    })
}
