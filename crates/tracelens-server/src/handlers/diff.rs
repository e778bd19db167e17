use axum::Json;

use crate::dto::{DiffRequest, DiffResponse};

/// POST /api/diff - Compare two JSON documents.
pub async fn compare(Json(request): Json<DiffRequest>) -> Json<DiffResponse> {
    let diff = tracelens_replay::diff(&request.original, &request.replay);
    let display = diff.format_for_display();
    Json(DiffResponse { diff, display })
}
