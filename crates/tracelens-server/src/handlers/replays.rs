//! Replay handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use tracelens_replay::{ReplayConfig, ReplayResult};

use crate::dto::{ReplayRequest, ReplaysResponse};
use crate::error::AppError;
use crate::state::ServerState;

/// POST /api/checkpoints/{id}/replay - Replay a checkpoint.
///
/// Timeouts and executor failures come back as an unsuccessful result, not
/// as an error status.
pub async fn replay(
    State(state): State<Arc<ServerState>>,
    Path(checkpoint_id): Path<String>,
    Json(request): Json<ReplayRequest>,
) -> Result<Json<ReplayResult>, AppError> {
    let timeout = match request.timeout_seconds {
        None => state.replay_timeout,
        Some(secs) => Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                AppError::BadRequest(format!("timeout_seconds must be positive, got {secs}"))
            })?,
    };

    let config = ReplayConfig {
        modified_input: request.modified_input,
        agent_overrides: request.agent_overrides,
        timeout,
        dry_run: request.dry_run,
    };

    let result = state.replays.replay(&checkpoint_id, config).await?;
    Ok(Json(result))
}

/// GET /api/replays/{id} - A stored replay result.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(replay_id): Path<String>,
) -> Result<Json<ReplayResult>, AppError> {
    let result = state.replays.get_replay(&replay_id)?;
    Ok(Json(result))
}

/// GET /api/traces/{id}/replays - Replay history of a trace, newest first.
pub async fn list_for_trace(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<ReplaysResponse>, AppError> {
    let replays = state.replays.replays_for_trace(&trace_id)?;
    Ok(Json(ReplaysResponse { replays }))
}
