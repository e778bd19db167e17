//! Trace, span, agent and message records.
//!
//! These are produced by the ingestion side and are immutable from the point
//! of view of analysis and replay. Timestamps are Unix milliseconds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::CoreError;

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Status of a whole trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

impl TraceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStatus::Running => "running",
            TraceStatus::Completed => "completed",
            TraceStatus::Failed => "failed",
            TraceStatus::Timeout => "timeout",
        }
    }
}

impl FromStr for TraceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TraceStatus::Running),
            "completed" => Ok(TraceStatus::Completed),
            "failed" => Ok(TraceStatus::Failed),
            "timeout" => Ok(TraceStatus::Timeout),
            other => Err(unknown("trace status", other)),
        }
    }
}

/// What a span recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    LlmCall,
    ToolCall,
    AgentMessage,
    Checkpoint,
    Handoff,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::LlmCall => "llm_call",
            SpanKind::ToolCall => "tool_call",
            SpanKind::AgentMessage => "agent_message",
            SpanKind::Checkpoint => "checkpoint",
            SpanKind::Handoff => "handoff",
        }
    }

    /// Kinds that mark a natural replay starting point.
    pub fn is_checkpointable(&self) -> bool {
        matches!(self, SpanKind::Handoff | SpanKind::ToolCall | SpanKind::LlmCall)
    }
}

impl FromStr for SpanKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm_call" => Ok(SpanKind::LlmCall),
            "tool_call" => Ok(SpanKind::ToolCall),
            "agent_message" => Ok(SpanKind::AgentMessage),
            "checkpoint" => Ok(SpanKind::Checkpoint),
            "handoff" => Ok(SpanKind::Handoff),
            other => Err(unknown("span kind", other)),
        }
    }
}

/// Outcome of a single span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Ok,
    Error,
    Timeout,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
            SpanStatus::Timeout => "timeout",
        }
    }
}

impl FromStr for SpanStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(SpanStatus::Ok),
            "error" => Ok(SpanStatus::Error),
            "timeout" => Ok(SpanStatus::Timeout),
            other => Err(unknown("span status", other)),
        }
    }
}

/// Type of an inter-agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Broadcast,
    Handoff,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Broadcast => "broadcast",
            MessageType::Handoff => "handoff",
        }
    }
}

impl FromStr for MessageType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(MessageType::Request),
            "response" => Ok(MessageType::Response),
            "broadcast" => Ok(MessageType::Broadcast),
            "handoff" => Ok(MessageType::Handoff),
            other => Err(unknown("message type", other)),
        }
    }
}

fn unknown(kind: &'static str, value: &str) -> CoreError {
    CoreError::UnknownVariant { kind, value: value.to_string() }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// One complete multi-agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Unique trace identifier.
    pub trace_id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Unix timestamp (milliseconds) when the trace started.
    pub start_time: i64,
    /// Unix timestamp (milliseconds) when the trace ended.
    pub end_time: Option<i64>,
    /// Execution status.
    pub status: TraceStatus,
    /// Free-form metadata from the ingestion side.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TraceRecord {
    pub fn new(trace_id: impl Into<String>, start_time: i64, status: TraceStatus) -> Self {
        Self {
            trace_id: trace_id.into(),
            name: None,
            start_time,
            end_time: None,
            status,
            metadata: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_end(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }
}

/// A single unit of execution within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Unique span identifier.
    pub span_id: String,
    /// Owning trace.
    pub trace_id: String,
    /// Parent span, if nested.
    pub parent_span_id: Option<String>,
    /// Agent that executed this span.
    pub agent_id: Option<String>,
    /// Operation name (tool name for tool calls).
    pub name: String,
    pub kind: SpanKind,
    /// Unix timestamp (milliseconds) when the span started.
    pub start_time: i64,
    /// Unix timestamp (milliseconds) when the span ended, if it did.
    pub end_time: Option<i64>,
    pub status: SpanStatus,
    /// Model identifier for LLM calls.
    pub model: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<Value>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Span {
    pub fn new(
        span_id: impl Into<String>,
        trace_id: impl Into<String>,
        name: impl Into<String>,
        kind: SpanKind,
        start_time: i64,
    ) -> Self {
        Self {
            span_id: span_id.into(),
            trace_id: trace_id.into(),
            parent_span_id: None,
            agent_id: None,
            name: name.into(),
            kind,
            start_time,
            end_time: None,
            status: SpanStatus::Ok,
            model: None,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            input: None,
            output: None,
            error: None,
            attributes: Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_end(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tokens(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }

    /// Wall-clock duration, if the span has ended.
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Whether `self` and `other` were running at the same time.
    ///
    /// A span without an end time is still running and open-ended.
    pub fn overlaps(&self, other: &Span) -> bool {
        let end_a = self.end_time.unwrap_or(i64::MAX);
        let end_b = other.end_time.unwrap_or(i64::MAX);
        self.start_time < end_b && other.start_time < end_a
    }

    /// Human-readable error text extracted from the error payload.
    ///
    /// A string payload is returned as-is, an object with a string `message`
    /// field yields that field, anything else is rendered as JSON.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => match map.get("message") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => Some(Value::Object(map.clone()).to_string()),
            },
            other => Some(other.to_string()),
        }
    }
}

/// A named participant within one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub trace_id: String,
    /// Unique within the trace.
    pub name: String,
    pub role: Option<String>,
    pub model: Option<String>,
    /// Originating framework (e.g. "langgraph", "crewai").
    pub framework: Option<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Aggregate counters as reported by ingestion.
    pub span_count: u32,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub error_count: u32,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        trace_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            trace_id: trace_id.into(),
            name: name.into(),
            role: None,
            model: None,
            framework: None,
            config: Map::new(),
            span_count: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            error_count: 0,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// A directed message between two agents of the same trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: String,
    pub trace_id: String,
    /// Span during which the message was emitted.
    pub span_id: Option<String>,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub message_type: MessageType,
    pub content: Value,
    /// Unix timestamp (milliseconds).
    pub timestamp: i64,
}

impl AgentMessage {
    pub fn new(
        message_id: impl Into<String>,
        trace_id: impl Into<String>,
        from_agent_id: impl Into<String>,
        to_agent_id: impl Into<String>,
        message_type: MessageType,
        timestamp: i64,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            trace_id: trace_id.into(),
            span_id: None,
            from_agent_id: from_agent_id.into(),
            to_agent_id: to_agent_id.into(),
            message_type,
            content: Value::Null,
            timestamp,
        }
    }

    pub fn with_span(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }
}
