//! Checkpoint handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracelens_replay::{AutoCheckpointReport, Checkpoint};

use crate::dto::CheckpointsResponse;
use crate::error::AppError;
use crate::state::ServerState;

/// GET /api/traces/{id}/checkpoints - Checkpoints of a trace, oldest first.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<CheckpointsResponse>, AppError> {
    let checkpoints = state.checkpoints.list_for_trace(&trace_id)?;
    Ok(Json(CheckpointsResponse { checkpoints }))
}

/// POST /api/traces/{id}/checkpoints/auto - Checkpoint every eligible span.
pub async fn auto(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<AutoCheckpointReport>, AppError> {
    let report = state.checkpoints.auto_checkpoint(&trace_id)?;
    Ok(Json(report))
}

/// GET /api/checkpoints/{id} - A checkpoint with its decoded state.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(checkpoint_id): Path<String>,
) -> Result<Json<Checkpoint>, AppError> {
    let checkpoint = state.checkpoints.load(&checkpoint_id)?;
    Ok(Json(checkpoint))
}

/// DELETE /api/checkpoints/{id} - Delete a checkpoint.
pub async fn delete(
    State(state): State<Arc<ServerState>>,
    Path(checkpoint_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.checkpoints.delete(&checkpoint_id)?;
    Ok(StatusCode::NO_CONTENT)
}
