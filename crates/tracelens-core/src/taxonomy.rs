//! Multi-agent failure taxonomy and the annotations that reference it.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::CoreError;

/// Top-level failure bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    /// Ambiguous or incorrect task definition.
    Specification,
    /// Problems in how agents interact.
    Coordination,
    /// Output quality problems.
    Verification,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Specification => "specification",
            FailureCategory::Coordination => "coordination",
            FailureCategory::Verification => "verification",
        }
    }
}

impl FromStr for FailureCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "specification" => Ok(FailureCategory::Specification),
            "coordination" => Ok(FailureCategory::Coordination),
            "verification" => Ok(FailureCategory::Verification),
            other => Err(CoreError::UnknownVariant {
                kind: "failure category",
                value: other.to_string(),
            }),
        }
    }
}

/// A specific failure mode. Each mode belongs to exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    AmbiguousGoal,
    ConflictingConstraints,
    ImpossibleTask,
    InfiniteLoop,
    HandoffFailure,
    ResourceContention,
    Deadlock,
    FormatError,
    Hallucination,
    IncompleteOutput,
}

/// Catalog entry describing a failure mode.
#[derive(Debug, Clone, Serialize)]
pub struct FailureModeInfo {
    pub mode: FailureMode,
    pub category: FailureCategory,
    pub name: &'static str,
    pub description: &'static str,
}

impl FailureMode {
    pub const ALL: [FailureMode; 10] = [
        FailureMode::AmbiguousGoal,
        FailureMode::ConflictingConstraints,
        FailureMode::ImpossibleTask,
        FailureMode::InfiniteLoop,
        FailureMode::HandoffFailure,
        FailureMode::ResourceContention,
        FailureMode::Deadlock,
        FailureMode::FormatError,
        FailureMode::Hallucination,
        FailureMode::IncompleteOutput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::AmbiguousGoal => "ambiguous_goal",
            FailureMode::ConflictingConstraints => "conflicting_constraints",
            FailureMode::ImpossibleTask => "impossible_task",
            FailureMode::InfiniteLoop => "infinite_loop",
            FailureMode::HandoffFailure => "handoff_failure",
            FailureMode::ResourceContention => "resource_contention",
            FailureMode::Deadlock => "deadlock",
            FailureMode::FormatError => "format_error",
            FailureMode::Hallucination => "hallucination",
            FailureMode::IncompleteOutput => "incomplete_output",
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            FailureMode::AmbiguousGoal
            | FailureMode::ConflictingConstraints
            | FailureMode::ImpossibleTask => FailureCategory::Specification,
            FailureMode::InfiniteLoop
            | FailureMode::HandoffFailure
            | FailureMode::ResourceContention
            | FailureMode::Deadlock => FailureCategory::Coordination,
            FailureMode::FormatError
            | FailureMode::Hallucination
            | FailureMode::IncompleteOutput => FailureCategory::Verification,
        }
    }

    /// Display name and description for the catalog.
    pub fn info(&self) -> FailureModeInfo {
        let (name, description) = match self {
            FailureMode::AmbiguousGoal => (
                "Ambiguous Goal",
                "Task goal is underspecified or has multiple interpretations",
            ),
            FailureMode::ConflictingConstraints => (
                "Conflicting Constraints",
                "Task constraints are mutually incompatible",
            ),
            FailureMode::ImpossibleTask => (
                "Impossible Task",
                "Task requirements cannot be satisfied with the available resources",
            ),
            FailureMode::InfiniteLoop => (
                "Infinite Loop",
                "Agents cycle repeatedly without making progress",
            ),
            FailureMode::HandoffFailure => (
                "Handoff Failure",
                "Agent fails to receive or process a handoff from another agent",
            ),
            FailureMode::ResourceContention => (
                "Resource Contention",
                "Concurrent use of the same tool or resource",
            ),
            FailureMode::Deadlock => (
                "Deadlock",
                "Execution stalled until it hit its time limit",
            ),
            FailureMode::FormatError => (
                "Format Error",
                "Output or message does not conform to the expected schema",
            ),
            FailureMode::Hallucination => (
                "Hallucination",
                "Agent generates factually incorrect information",
            ),
            FailureMode::IncompleteOutput => (
                "Incomplete Output",
                "Agent output is missing required information",
            ),
        };
        FailureModeInfo { mode: *self, category: self.category(), name, description }
    }

    /// All modes of one category, in catalog order.
    pub fn in_category(category: FailureCategory) -> Vec<FailureMode> {
        Self::ALL.iter().copied().filter(|m| m.category() == category).collect()
    }
}

impl FromStr for FailureMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "failure mode",
                value: s.to_string(),
            })
    }
}

/// Who produced an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSource {
    Auto,
    Manual,
}

impl AnnotationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationSource::Auto => "auto",
            AnnotationSource::Manual => "manual",
        }
    }
}

impl FromStr for AnnotationSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(AnnotationSource::Auto),
            "manual" => Ok(AnnotationSource::Manual),
            other => Err(CoreError::UnknownVariant {
                kind: "annotation source",
                value: other.to_string(),
            }),
        }
    }
}

/// A classified failure within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnnotation {
    pub annotation_id: String,
    pub trace_id: String,
    pub span_id: Option<String>,
    pub agent_id: Option<String>,
    pub category: FailureCategory,
    pub failure_mode: FailureMode,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
    pub source: AnnotationSource,
}

impl FailureAnnotation {
    /// Creates an automatic annotation. The id is left empty for the
    /// classifier to assign.
    pub fn auto(
        trace_id: impl Into<String>,
        mode: FailureMode,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self::with_source(trace_id, mode, confidence, reasoning, AnnotationSource::Auto)
    }

    /// Creates a reviewer annotation.
    pub fn manual(
        annotation_id: impl Into<String>,
        trace_id: impl Into<String>,
        mode: FailureMode,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self::with_source(trace_id, mode, confidence, reasoning, AnnotationSource::Manual)
            .with_id(annotation_id)
    }

    fn with_source(
        trace_id: impl Into<String>,
        mode: FailureMode,
        confidence: f64,
        reasoning: impl Into<String>,
        source: AnnotationSource,
    ) -> Self {
        Self {
            annotation_id: String::new(),
            trace_id: trace_id.into(),
            span_id: None,
            agent_id: None,
            category: mode.category(),
            failure_mode: mode,
            confidence: clamp_confidence(confidence),
            reasoning: reasoning.into(),
            source,
        }
    }

    pub fn with_id(mut self, annotation_id: impl Into<String>) -> Self {
        self.annotation_id = annotation_id.into();
        self
    }

    pub fn on_span(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    pub fn on_agent(mut self, agent_id: Option<&str>) -> Self {
        self.agent_id = agent_id.map(str::to_string);
        self
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
