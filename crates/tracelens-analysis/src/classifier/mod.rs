//! Rule-based failure classification.

mod rules;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use tracelens_core::hash::sha256_hex;
use tracelens_core::{Agent, AgentMessage, FailureAnnotation, Span};
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::graph::AgentGraph;

/// Everything a rule may look at. Borrowed, never mutated.
#[derive(Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub trace_id: &'a str,
    pub spans: &'a [Span],
    pub agents: &'a [Agent],
    pub messages: &'a [AgentMessage],
    pub graph: Option<&'a AgentGraph>,
}

impl<'a> ClassificationInput<'a> {
    /// Display name of an agent, falling back to its id.
    fn agent_name(&self, agent_id: &'a str) -> &'a str {
        self.agents
            .iter()
            .find(|a| a.agent_id == agent_id)
            .map(|a| a.name.as_str())
            .unwrap_or(agent_id)
    }
}

/// A detection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    InfiniteLoop,
    HandoffFailure,
    ResourceContention,
    FormatError,
    Timeout,
}

impl Rule {
    /// Every rule, in evaluation order.
    pub const ALL: [Rule; 5] = [
        Rule::InfiniteLoop,
        Rule::HandoffFailure,
        Rule::ResourceContention,
        Rule::FormatError,
        Rule::Timeout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::InfiniteLoop => "infinite_loop",
            Rule::HandoffFailure => "handoff_failure",
            Rule::ResourceContention => "resource_contention",
            Rule::FormatError => "format_error",
            Rule::Timeout => "timeout",
        }
    }

    pub fn apply(&self, input: &ClassificationInput<'_>) -> Result<Vec<FailureAnnotation>, AnalysisError> {
        match self {
            Rule::InfiniteLoop => rules::infinite_loop(input),
            Rule::HandoffFailure => rules::handoff_failure(input),
            Rule::ResourceContention => rules::resource_contention(input),
            Rule::FormatError => rules::format_error(input),
            Rule::Timeout => rules::timeout(input),
        }
    }
}

/// Runs an ordered list of rules over one trace.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    rules: Vec<Rule>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureClassifier {
    pub fn new() -> Self {
        Self { rules: Rule::ALL.to_vec() }
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Applies every rule and returns annotations sorted by descending
    /// confidence, ties kept in rule order.
    ///
    /// A rule that errors or panics is logged and skipped.
    pub fn classify(&self, input: &ClassificationInput<'_>) -> Vec<FailureAnnotation> {
        let mut annotations = Vec::new();

        for rule in &self.rules {
            annotations.extend(run_rule(rule.name(), input.trace_id, || rule.apply(input)));
        }

        assign_ids(input.trace_id, &mut annotations);
        annotations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        annotations
    }
}

/// Runs one rule, turning an error or panic into an empty result.
fn run_rule(
    name: &str,
    trace_id: &str,
    rule: impl FnOnce() -> Result<Vec<FailureAnnotation>, AnalysisError>,
) -> Vec<FailureAnnotation> {
    match panic::catch_unwind(AssertUnwindSafe(rule)) {
        Ok(Ok(found)) => {
            debug!(rule = name, count = found.len(), "Rule finished");
            found
        }
        Ok(Err(e)) => {
            warn!(rule = name, trace_id, error = %e, "Rule failed, skipping");
            Vec::new()
        }
        Err(_) => {
            warn!(rule = name, trace_id, "Rule panicked, skipping");
            Vec::new()
        }
    }
}

/// Derives annotation ids from content so reruns reproduce them.
fn assign_ids(trace_id: &str, annotations: &mut [FailureAnnotation]) {
    let mut ordinals: HashMap<String, usize> = HashMap::new();

    for annotation in annotations.iter_mut() {
        let key = format!(
            "{}|{}|{}|{}",
            trace_id,
            annotation.failure_mode.as_str(),
            annotation.span_id.as_deref().unwrap_or(""),
            annotation.agent_id.as_deref().unwrap_or(""),
        );
        let ordinal = ordinals.entry(key.clone()).or_insert(0);
        let digest = sha256_hex(format!("{key}|{ordinal}").as_bytes());
        *ordinal += 1;
        annotation.annotation_id = format!("ann-{}", &digest[..16]);
    }
}
