use thiserror::Error;
use tracelens_core::CoreError;
use tracelens_store::StoreError;

/// Errors from graph building, metrics and classification.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Trace not found: {0}")]
    TraceNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Span {span_id} does not belong to trace {trace_id}")]
    SpanNotInTrace { span_id: String, trace_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AnalysisError {
    /// Whether the error names something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AnalysisError::TraceNotFound(_)
                | AnalysisError::AgentNotFound(_)
                | AnalysisError::SpanNotInTrace { .. }
        )
    }
}
