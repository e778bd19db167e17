//! Content-addressed checkpoints.
//!
//! A checkpoint id is `{trace_id}:{span_id}:{state_hash}`, so saving the same
//! state at the same span twice is a no-op.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracelens_core::{now_ms, Span};
use tracelens_store::{CheckpointListing, CheckpointRecord, TraceStore};
use tracing::{debug, info};

use crate::error::CheckpointError;
use crate::snapshot::StateSnapshot;

/// A checkpoint about to be saved.
#[derive(Debug, Clone)]
pub struct CheckpointCandidate {
    pub trace_id: String,
    pub span_id: String,
    pub agent_id: Option<String>,
    pub name: String,
    pub snapshot: StateSnapshot,
}

/// A loaded checkpoint with its decoded snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub agent_id: Option<String>,
    pub name: String,
    pub state: StateSnapshot,
    pub state_hash: String,
    pub timestamp: i64,
    pub replay_count: u32,
    pub last_replayed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedCheckpoint {
    pub checkpoint_id: String,
    /// `false` when an identical checkpoint already existed.
    pub created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutoCheckpointReport {
    /// Every checkpoint id for the trace's checkpointable spans, in span order.
    pub checkpoint_ids: Vec<String>,
    pub created: usize,
}

pub fn checkpoint_id(trace_id: &str, span_id: &str, state_hash: &str) -> String {
    format!("{trace_id}:{span_id}:{state_hash}")
}

pub struct CheckpointManager {
    store: Arc<TraceStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<TraceStore>) -> Self {
        Self { store }
    }

    /// Validates and stores a checkpoint unless an identical one exists.
    pub fn save(&self, candidate: CheckpointCandidate) -> Result<SavedCheckpoint, CheckpointError> {
        let belongs = self
            .store
            .get_span(&candidate.span_id)?
            .is_some_and(|s| s.trace_id == candidate.trace_id);
        if !belongs {
            return Err(CheckpointError::SpanNotInTrace {
                span_id: candidate.span_id,
                trace_id: candidate.trace_id,
            });
        }

        let state_hash = candidate.snapshot.state_hash()?;
        let id = checkpoint_id(&candidate.trace_id, &candidate.span_id, &state_hash);

        let record = CheckpointRecord {
            checkpoint_id: id.clone(),
            trace_id: candidate.trace_id,
            span_id: candidate.span_id,
            agent_id: candidate.agent_id,
            name: candidate.name,
            state: candidate.snapshot.encode()?,
            state_hash,
            timestamp: now_ms(),
            replay_count: 0,
            last_replayed: None,
        };
        let created = self.store.insert_checkpoint(&record)?;
        debug!(checkpoint_id = %id, created, "Saved checkpoint");

        Ok(SavedCheckpoint { checkpoint_id: id, created })
    }

    pub fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let record = self
            .store
            .get_checkpoint(checkpoint_id)?
            .ok_or_else(|| CheckpointError::CheckpointNotFound(checkpoint_id.to_string()))?;

        Ok(Checkpoint {
            checkpoint_id: record.checkpoint_id,
            trace_id: record.trace_id,
            span_id: record.span_id,
            agent_id: record.agent_id,
            name: record.name,
            state: StateSnapshot::decode(record.state)?,
            state_hash: record.state_hash,
            timestamp: record.timestamp,
            replay_count: record.replay_count,
            last_replayed: record.last_replayed,
        })
    }

    pub fn list_for_trace(&self, trace_id: &str) -> Result<Vec<CheckpointListing>, CheckpointError> {
        self.require_trace(trace_id)?;
        Ok(self.store.list_checkpoints(trace_id)?)
    }

    pub fn delete(&self, checkpoint_id: &str) -> Result<(), CheckpointError> {
        if !self.store.delete_checkpoint(checkpoint_id)? {
            return Err(CheckpointError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        info!(checkpoint_id, "Deleted checkpoint");
        Ok(())
    }

    /// Checkpoints every handoff, tool call and LLM call of a trace.
    pub fn auto_checkpoint(&self, trace_id: &str) -> Result<AutoCheckpointReport, CheckpointError> {
        self.require_trace(trace_id)?;
        let spans = self.store.get_spans(trace_id)?;
        let agents = self.store.get_agents(trace_id)?;

        let mut report = AutoCheckpointReport::default();
        for (idx, span) in spans.iter().enumerate() {
            if !span.kind.is_checkpointable() {
                continue;
            }

            let agent = span
                .agent_id
                .as_deref()
                .and_then(|id| agents.iter().find(|a| a.agent_id == id));
            let snapshot = StateSnapshot::capture(span, agent, prior_output(&spans[..idx], span));

            let saved = self.save(CheckpointCandidate {
                trace_id: trace_id.to_string(),
                span_id: span.span_id.clone(),
                agent_id: span.agent_id.clone(),
                name: format!("auto:{}:{}", span.kind.as_str(), span.name),
                snapshot,
            })?;

            if saved.created {
                report.created += 1;
            }
            report.checkpoint_ids.push(saved.checkpoint_id);
        }

        info!(
            trace_id,
            checkpoints = report.checkpoint_ids.len(),
            created = report.created,
            "Auto-checkpointed trace"
        );
        Ok(report)
    }

    fn require_trace(&self, trace_id: &str) -> Result<(), CheckpointError> {
        match self.store.get_trace(trace_id)? {
            Some(_) => Ok(()),
            None => Err(CheckpointError::TraceNotFound(trace_id.to_string())),
        }
    }
}

/// Latest output recorded by the same agent before `span` started.
///
/// `earlier` must be in chronological order.
fn prior_output(earlier: &[Span], span: &Span) -> Option<Value> {
    let agent_id = span.agent_id.as_deref()?;
    earlier
        .iter()
        .rev()
        .filter(|s| s.agent_id.as_deref() == Some(agent_id) && s.start_time < span.start_time)
        .find_map(|s| s.output.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracelens_core::{Agent, SpanKind, TraceRecord, TraceStatus};

    fn manager() -> CheckpointManager {
        let store = Arc::new(TraceStore::in_memory().unwrap());
        store.insert_trace(&TraceRecord::new("t", 0, TraceStatus::Completed)).unwrap();
        store.insert_trace(&TraceRecord::new("other", 0, TraceStatus::Completed)).unwrap();
        store
            .insert_agent(&Agent::new("a", "t", "researcher").with_framework("langgraph"))
            .unwrap();
        store
            .insert_span(
                &Span::new("s1", "t", "think", SpanKind::LlmCall, 10)
                    .with_agent("a")
                    .with_input(json!({"q": 1}))
                    .with_output(json!({"plan": "search"})),
            )
            .unwrap();
        store
            .insert_span(&Span::new("s2", "t", "note", SpanKind::AgentMessage, 20).with_agent("a"))
            .unwrap();
        store
            .insert_span(
                &Span::new("s3", "t", "search", SpanKind::ToolCall, 30)
                    .with_agent("a")
                    .with_input(json!({"query": "rust"}))
                    .with_output(json!({"hits": 2})),
            )
            .unwrap();
        CheckpointManager::new(store)
    }

    fn candidate(trace_id: &str, span_id: &str) -> CheckpointCandidate {
        let span = Span::new(span_id, trace_id, "x", SpanKind::LlmCall, 0);
        CheckpointCandidate {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            agent_id: None,
            name: "manual".to_string(),
            snapshot: StateSnapshot::capture(&span, None, None),
        }
    }

    #[test]
    fn test_save_twice_is_one_row() {
        let manager = manager();
        let first = manager.save(candidate("t", "s1")).unwrap();
        let second = manager.save(candidate("t", "s1")).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.checkpoint_id, second.checkpoint_id);
        assert!(first.checkpoint_id.starts_with("t:s1:"));
        assert_eq!(manager.list_for_trace("t").unwrap().len(), 1);
    }

    #[test]
    fn test_save_rejects_span_from_other_trace() {
        let manager = manager();
        let err = manager.save(candidate("other", "s1")).unwrap_err();
        assert!(matches!(err, CheckpointError::SpanNotInTrace { .. }));
    }

    #[test]
    fn test_auto_checkpoint_is_idempotent() {
        let manager = manager();

        let first = manager.auto_checkpoint("t").unwrap();
        assert_eq!(first.checkpoint_ids.len(), 2);
        assert_eq!(first.created, 2);

        let second = manager.auto_checkpoint("t").unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.checkpoint_ids, first.checkpoint_ids);

        let loaded = manager.load(&first.checkpoint_ids[1]).unwrap();
        assert_eq!(loaded.name, "auto:tool_call:search");
        assert_eq!(loaded.state.prior_output, Some(json!({"plan": "search"})));
        assert_eq!(loaded.state.framework(), Some("langgraph"));

        let listing = manager.list_for_trace("t").unwrap();
        assert_eq!(listing[0].agent_name.as_deref(), Some("researcher"));
    }

    #[test]
    fn test_load_and_delete_missing() {
        let manager = manager();
        assert!(manager.load("nope").unwrap_err().is_not_found());
        assert!(manager.delete("nope").unwrap_err().is_not_found());
        assert!(manager.list_for_trace("nope").unwrap_err().is_not_found());
    }
}
