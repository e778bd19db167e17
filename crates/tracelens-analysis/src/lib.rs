//! Trace analysis for tracelens.
//!
//! - [`AgentGraph`] - who talked to whom, how often and how quickly
//! - [`TraceMetrics`] - duration, token and cost totals
//! - [`FailureClassifier`] - rule-based failure detection against the
//!   failure taxonomy
//! - [`TraceAnalyzer`] - the store-backed entry point used by the server

pub mod classifier;
mod error;
pub mod graph;
pub mod metrics;
mod service;

pub use classifier::{ClassificationInput, FailureClassifier, Rule};
pub use error::AnalysisError;
pub use graph::{AgentGraph, AgentGraphEdge, AgentGraphNode, AgentPaths, GraphMetrics};
pub use metrics::{AgentMetrics, TraceMetrics};
pub use service::{BatchReport, ManualAnnotation, TraceAnalyzer};
