use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracelens_core::{FailureAnnotation, FailureModeInfo};
use tracelens_replay::{Diff, ReplayResult};
use tracelens_store::CheckpointListing;

// === Graph ===

#[derive(Debug, Deserialize)]
pub struct PathsQuery {
    pub from: String,
    pub to: String,
}

// === Failures ===

#[derive(Debug, Serialize)]
pub struct FailuresResponse {
    pub annotations: Vec<FailureAnnotation>,
}

#[derive(Debug, Serialize)]
pub struct TaxonomyResponse {
    pub failure_modes: Vec<FailureModeInfo>,
}

// === Checkpoints ===

#[derive(Debug, Serialize)]
pub struct CheckpointsResponse {
    pub checkpoints: Vec<CheckpointListing>,
}

// === Replay ===

#[derive(Debug, Default, Deserialize)]
pub struct ReplayRequest {
    pub modified_input: Option<Value>,
    #[serde(default)]
    pub agent_overrides: Map<String, Value>,
    pub timeout_seconds: Option<f64>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct ReplaysResponse {
    pub replays: Vec<ReplayResult>,
}

// === Diff ===

#[derive(Debug, Deserialize)]
pub struct DiffRequest {
    pub original: Value,
    pub replay: Value,
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    #[serde(flatten)]
    pub diff: Diff,
    pub display: String,
}
