//! Agent graph and trace metrics handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use tracelens_analysis::{AgentGraph, AgentPaths, TraceMetrics};

use crate::dto::PathsQuery;
use crate::error::AppError;
use crate::state::ServerState;

/// GET /api/traces/{id}/graph - Communication graph of a trace.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<AgentGraph>, AppError> {
    let graph = state.analyzer.graph(&trace_id)?;
    Ok(Json(graph))
}

/// GET /api/traces/{id}/graph/paths?from=&to= - Paths between two agents.
pub async fn paths(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
    Query(query): Query<PathsQuery>,
) -> Result<Json<AgentPaths>, AppError> {
    let paths = state.analyzer.paths(&trace_id, &query.from, &query.to)?;
    Ok(Json(paths))
}

/// GET /api/traces/{id}/metrics - Token, cost and latency totals.
pub async fn metrics(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<TraceMetrics>, AppError> {
    let metrics = state.analyzer.metrics(&trace_id)?;
    Ok(Json(metrics))
}
