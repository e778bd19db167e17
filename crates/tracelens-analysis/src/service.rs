//! Store-backed entry points for graph, metrics and classification.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracelens_core::{FailureAnnotation, FailureMode, TraceRecord};
use tracelens_store::TraceStore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{ClassificationInput, FailureClassifier};
use crate::error::AnalysisError;
use crate::graph::{AgentGraph, AgentPaths};
use crate::metrics::TraceMetrics;

/// A reviewer-supplied annotation.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualAnnotation {
    pub failure_mode: FailureMode,
    #[serde(default = "default_manual_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    pub span_id: Option<String>,
    pub agent_id: Option<String>,
}

fn default_manual_confidence() -> f64 {
    1.0
}

/// Outcome of a batch classification run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub classified: Vec<String>,
    pub failed: Vec<String>,
    pub annotations_written: usize,
}

/// Analysis operations over stored traces.
pub struct TraceAnalyzer {
    store: Arc<TraceStore>,
    classifier: FailureClassifier,
}

impl TraceAnalyzer {
    pub fn new(store: Arc<TraceStore>) -> Self {
        Self { store, classifier: FailureClassifier::new() }
    }

    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    fn require_trace(&self, trace_id: &str) -> Result<TraceRecord, AnalysisError> {
        self.store
            .get_trace(trace_id)?
            .ok_or_else(|| AnalysisError::TraceNotFound(trace_id.to_string()))
    }

    /// Builds the communication graph of a trace.
    pub fn graph(&self, trace_id: &str) -> Result<AgentGraph, AnalysisError> {
        self.require_trace(trace_id)?;
        let agents = self.store.get_agents(trace_id)?;
        let spans = self.store.get_spans(trace_id)?;
        let messages = self.store.get_messages(trace_id)?;
        Ok(AgentGraph::build(&agents, &spans, &messages))
    }

    /// All simple paths between two agents of a trace, by agent name.
    pub fn paths(&self, trace_id: &str, from: &str, to: &str) -> Result<AgentPaths, AnalysisError> {
        self.graph(trace_id)?.paths(from, to)
    }

    pub fn metrics(&self, trace_id: &str) -> Result<TraceMetrics, AnalysisError> {
        self.require_trace(trace_id)?;
        let agents = self.store.get_agents(trace_id)?;
        let spans = self.store.get_spans(trace_id)?;
        Ok(TraceMetrics::compute(trace_id, &agents, &spans))
    }

    /// Classifies a trace and replaces its automatic annotations.
    ///
    /// Returns the new automatic annotations, highest confidence first.
    pub fn classify(&self, trace_id: &str) -> Result<Vec<FailureAnnotation>, AnalysisError> {
        self.require_trace(trace_id)?;
        let agents = self.store.get_agents(trace_id)?;
        let spans = self.store.get_spans(trace_id)?;
        let messages = self.store.get_messages(trace_id)?;
        let graph = AgentGraph::build(&agents, &spans, &messages);

        let input = ClassificationInput {
            trace_id,
            spans: &spans,
            agents: &agents,
            messages: &messages,
            graph: Some(&graph),
        };
        let annotations = self.classifier.classify(&input);

        self.store.replace_auto_annotations(trace_id, &annotations)?;
        info!(trace_id, count = annotations.len(), "Classified trace");

        Ok(annotations)
    }

    /// Stored annotations of a trace, automatic and manual.
    pub fn annotations(&self, trace_id: &str) -> Result<Vec<FailureAnnotation>, AnalysisError> {
        self.require_trace(trace_id)?;
        Ok(self.store.get_annotations(trace_id)?)
    }

    /// Records a reviewer annotation.
    pub fn annotate(
        &self,
        trace_id: &str,
        manual: ManualAnnotation,
    ) -> Result<FailureAnnotation, AnalysisError> {
        self.require_trace(trace_id)?;

        if let Some(span_id) = manual.span_id.as_deref() {
            let in_trace = self
                .store
                .get_span(span_id)?
                .is_some_and(|s| s.trace_id == trace_id);
            if !in_trace {
                return Err(AnalysisError::SpanNotInTrace {
                    span_id: span_id.to_string(),
                    trace_id: trace_id.to_string(),
                });
            }
        }
        if let Some(agent_id) = manual.agent_id.as_deref() {
            let in_trace = self
                .store
                .get_agent(agent_id)?
                .is_some_and(|a| a.trace_id == trace_id);
            if !in_trace {
                return Err(AnalysisError::AgentNotFound(agent_id.to_string()));
            }
        }

        let mut annotation = FailureAnnotation::manual(
            format!("ann-{}", Uuid::new_v4()),
            trace_id,
            manual.failure_mode,
            manual.confidence,
            manual.reasoning,
        )
        .on_agent(manual.agent_id.as_deref());
        annotation.span_id = manual.span_id;

        self.store.insert_annotation(&annotation)?;
        info!(trace_id, annotation_id = %annotation.annotation_id, "Recorded manual annotation");

        Ok(annotation)
    }

    /// Classifies up to `limit` failed traces that have no annotations yet.
    ///
    /// A trace that fails to classify is logged and reported, not fatal.
    pub fn classify_pending(&self, limit: u32) -> Result<BatchReport, AnalysisError> {
        let pending = self.store.unclassified_failed_traces(limit)?;
        let mut report = BatchReport::default();

        for trace_id in pending {
            match self.classify(&trace_id) {
                Ok(annotations) => {
                    report.annotations_written += annotations.len();
                    report.classified.push(trace_id);
                }
                Err(e) => {
                    warn!(trace_id = %trace_id, error = %e, "Batch classification failed");
                    report.failed.push(trace_id);
                }
            }
        }

        info!(
            classified = report.classified.len(),
            failed = report.failed.len(),
            "Batch classification finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracelens_core::{
        Agent, AgentMessage, AnnotationSource, MessageType, Span, SpanKind, SpanStatus, TraceStatus,
    };

    fn analyzer_with_trace() -> TraceAnalyzer {
        let store = Arc::new(TraceStore::in_memory().unwrap());
        store.insert_trace(&TraceRecord::new("t1", 0, TraceStatus::Failed)).unwrap();
        store.insert_agent(&Agent::new("a", "t1", "planner")).unwrap();
        store.insert_agent(&Agent::new("b", "t1", "coder")).unwrap();
        store
            .insert_span(&Span::new("h", "t1", "delegate", SpanKind::Handoff, 10).with_agent("a"))
            .unwrap();
        store
            .insert_span(
                &Span::new("b1", "t1", "write", SpanKind::LlmCall, 20)
                    .with_agent("b")
                    .with_status(SpanStatus::Error)
                    .with_error(json!("schema mismatch")),
            )
            .unwrap();
        store
            .insert_message(
                &AgentMessage::new("m", "t1", "a", "b", MessageType::Handoff, 10).with_span("h"),
            )
            .unwrap();
        TraceAnalyzer::new(store)
    }

    #[test]
    fn test_missing_trace_is_not_found() {
        let analyzer = analyzer_with_trace();
        let err = analyzer.graph("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_replaces_and_is_idempotent() {
        let analyzer = analyzer_with_trace();

        let first = analyzer.classify("t1").unwrap();
        assert_eq!(first.len(), 2);
        let second = analyzer.classify("t1").unwrap();
        assert_eq!(first, second);

        let stored = analyzer.annotations("t1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].failure_mode, FailureMode::FormatError);
    }

    #[test]
    fn test_manual_annotation_survives_classification() {
        let analyzer = analyzer_with_trace();
        let manual = ManualAnnotation {
            failure_mode: FailureMode::Hallucination,
            confidence: 0.9,
            reasoning: "made up an API".into(),
            span_id: Some("b1".into()),
            agent_id: Some("b".into()),
        };
        analyzer.annotate("t1", manual).unwrap();
        analyzer.classify("t1").unwrap();

        let stored = analyzer.annotations("t1").unwrap();
        assert_eq!(stored.iter().filter(|a| a.source == AnnotationSource::Manual).count(), 1);
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn test_manual_annotation_rejects_foreign_span() {
        let analyzer = analyzer_with_trace();
        let manual = ManualAnnotation {
            failure_mode: FailureMode::Hallucination,
            confidence: 0.9,
            reasoning: String::new(),
            span_id: Some("nope".into()),
            agent_id: None,
        };
        assert!(matches!(
            analyzer.annotate("t1", manual),
            Err(AnalysisError::SpanNotInTrace { .. })
        ));
    }

    #[test]
    fn test_batch_classifies_unannotated_failures_once() {
        let analyzer = analyzer_with_trace();

        let report = analyzer.classify_pending(10).unwrap();
        assert_eq!(report.classified, vec!["t1".to_string()]);
        assert_eq!(report.annotations_written, 2);

        let report = analyzer.classify_pending(10).unwrap();
        assert!(report.classified.is_empty());
    }

    #[test]
    fn test_paths_through_service() {
        let analyzer = analyzer_with_trace();
        let paths = analyzer.paths("t1", "planner", "coder").unwrap();
        assert_eq!(paths.paths, vec![vec!["planner".to_string(), "coder".to_string()]]);
    }
}
