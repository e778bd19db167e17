//! Versioned checkpoint state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracelens_core::hash::short_hash;
use tracelens_core::{Agent, CoreError, Span, SpanKind};

/// Current snapshot layout. Decoding rejects anything else.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot has no schema_version")]
    MissingVersion,

    #[error("Unsupported snapshot schema version {0}")]
    UnsupportedVersion(u64),

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Agent configuration captured with a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub name: String,
    pub role: Option<String>,
    pub model: Option<String>,
    pub framework: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl From<&Agent> for AgentState {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name.clone(),
            role: agent.role.clone(),
            model: agent.model.clone(),
            framework: agent.framework.clone(),
            config: agent.config.clone(),
        }
    }
}

/// Everything needed to re-run one span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub schema_version: u32,
    pub span_kind: SpanKind,
    pub span_name: String,
    pub input: Option<Value>,
    /// Output recorded for the span itself.
    pub output: Option<Value>,
    /// Most recent earlier output of the same agent.
    pub prior_output: Option<Value>,
    pub agent: Option<AgentState>,
}

impl StateSnapshot {
    pub fn capture(span: &Span, agent: Option<&Agent>, prior_output: Option<Value>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            span_kind: span.kind,
            span_name: span.name.clone(),
            input: span.input.clone(),
            output: span.output.clone(),
            prior_output,
            agent: agent.map(AgentState::from),
        }
    }

    /// Framework of the captured agent, if it declared one.
    pub fn framework(&self) -> Option<&str> {
        self.agent.as_ref().and_then(|a| a.framework.as_deref())
    }

    pub fn encode(&self) -> Result<Value, SnapshotError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn decode(value: Value) -> Result<Self, SnapshotError> {
        match value.get("schema_version").and_then(Value::as_u64) {
            None => Err(SnapshotError::MissingVersion),
            Some(v) if v != u64::from(SNAPSHOT_SCHEMA_VERSION) => {
                Err(SnapshotError::UnsupportedVersion(v))
            }
            Some(_) => Ok(serde_json::from_value(value)?),
        }
    }

    /// Short content hash over the canonical encoding.
    pub fn state_hash(&self) -> Result<String, CoreError> {
        short_hash(self)
    }
}
