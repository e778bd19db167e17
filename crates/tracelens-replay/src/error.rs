use thiserror::Error;
use tracelens_core::CoreError;
use tracelens_store::StoreError;

use crate::snapshot::SnapshotError;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Trace not found: {0}")]
    TraceNotFound(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Span {span_id} does not belong to trace {trace_id}")]
    SpanNotInTrace { span_id: String, trace_id: String },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CheckpointError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CheckpointError::TraceNotFound(_)
                | CheckpointError::CheckpointNotFound(_)
                | CheckpointError::SpanNotInTrace { .. }
        )
    }
}

/// Errors that stop a replay before it runs.
///
/// Timeouts and collaborator failures are not errors; they are recorded in
/// the replay result.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Original span not found: {0}")]
    SpanNotFound(String),

    #[error("No executor registered for framework '{0}'")]
    NoExecutorRegistered(String),

    #[error("Replay not found: {0}")]
    ReplayNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReplayError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ReplayError::Checkpoint(e) => e.is_not_found(),
            ReplayError::SpanNotFound(_) | ReplayError::ReplayNotFound(_) => true,
            _ => false,
        }
    }
}
