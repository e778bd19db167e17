//! Core domain types and error definitions for tracelens.
//!
//! This crate provides the records shared by every tracelens component:
//!
//! - [`Span`], [`Agent`], [`AgentMessage`] and [`TraceRecord`] - what the
//!   ingestion side writes and the analysis side reads
//! - [`FailureAnnotation`] and the failure taxonomy ([`FailureCategory`],
//!   [`FailureMode`])
//! - [`hash`] - canonical JSON hashing used for content addressing
//!
//! # Example
//!
//! ```rust
//! use tracelens_core::{Span, SpanKind, SpanStatus};
//!
//! let span = Span::new("span-1", "trace-1", "search", SpanKind::ToolCall, 1_000)
//!     .with_agent("agent-a")
//!     .with_end(1_250)
//!     .with_status(SpanStatus::Ok);
//!
//! assert_eq!(span.duration_ms(), Some(250));
//! ```

pub mod hash;
mod record;
mod taxonomy;

pub use record::{
    Agent, AgentMessage, MessageType, Span, SpanKind, SpanStatus, TraceRecord, TraceStatus,
};
pub use taxonomy::{
    AnnotationSource, FailureAnnotation, FailureCategory, FailureMode, FailureModeInfo,
};

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors raised while converting or hashing core records.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A stored string did not name a known enum variant.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// JSON encoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
