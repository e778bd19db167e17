//! Failure annotation handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracelens_analysis::ManualAnnotation;
use tracelens_core::{FailureAnnotation, FailureMode};

use crate::dto::{FailuresResponse, TaxonomyResponse};
use crate::error::AppError;
use crate::state::ServerState;

/// GET /api/traces/{id}/failures - Stored annotations, automatic and manual.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<FailuresResponse>, AppError> {
    let annotations = state.analyzer.annotations(&trace_id)?;
    Ok(Json(FailuresResponse { annotations }))
}

/// POST /api/traces/{id}/failures/classify - Re-run the rule classifier.
pub async fn classify(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<FailuresResponse>, AppError> {
    let annotations = state.analyzer.classify(&trace_id)?;
    Ok(Json(FailuresResponse { annotations }))
}

/// POST /api/traces/{id}/failures - Record a reviewer annotation.
pub async fn annotate(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
    Json(manual): Json<ManualAnnotation>,
) -> Result<(StatusCode, Json<FailureAnnotation>), AppError> {
    if !(0.0..=1.0).contains(&manual.confidence) {
        return Err(AppError::BadRequest(format!(
            "confidence must be between 0 and 1, got {}",
            manual.confidence
        )));
    }

    let annotation = state.analyzer.annotate(&trace_id, manual)?;
    Ok((StatusCode::CREATED, Json(annotation)))
}

/// GET /api/taxonomy - The failure mode catalog.
pub async fn taxonomy() -> Json<TaxonomyResponse> {
    let failure_modes = FailureMode::ALL.iter().map(|mode| mode.info()).collect();
    Json(TaxonomyResponse { failure_modes })
}
