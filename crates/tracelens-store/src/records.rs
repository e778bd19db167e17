//! Row types for checkpoint and replay tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored checkpoint. `state` is the encoded snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub checkpoint_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub agent_id: Option<String>,
    /// Human-readable name (e.g. "auto:handoff:planner").
    pub name: String,
    pub state: Value,
    /// Short content hash of `state`.
    pub state_hash: String,
    /// Unix timestamp (milliseconds) when the checkpoint was first written.
    pub timestamp: i64,
    pub replay_count: u32,
    pub last_replayed: Option<i64>,
}

/// A checkpoint joined with the names of its agent and span, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointListing {
    pub checkpoint_id: String,
    pub name: String,
    pub timestamp: i64,
    pub span_id: String,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub span_name: Option<String>,
    pub span_kind: Option<String>,
    pub replay_count: u32,
}

/// One stored replay attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub replay_id: String,
    pub checkpoint_id: String,
    pub trace_id: String,
    /// Replay configuration used for this attempt.
    pub config: Value,
    pub original_output: Option<Value>,
    pub replay_output: Option<Value>,
    pub diff: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub tokens_used: Option<u64>,
    pub cost_usd: Option<f64>,
    /// Unix timestamp (milliseconds).
    pub created_at: i64,
}
