//! Individual failure detection rules.
//!
//! Every rule is a pure function of [`ClassificationInput`]. Annotation ids
//! are assigned afterwards by the classifier.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracelens_core::hash::content_hash;
use tracelens_core::{FailureAnnotation, FailureMode, Span, SpanKind, SpanStatus};

use super::ClassificationInput;
use crate::error::AnalysisError;

/// Repeats of one input beyond which an agent is considered stuck.
const LOOP_THRESHOLD: usize = 3;
const LOOP_BASE_CONFIDENCE: f64 = 0.5;
const LOOP_CONFIDENCE_STEP: f64 = 0.1;
const LOOP_MAX_CONFIDENCE: f64 = 0.9;

const HANDOFF_CONFIDENCE: f64 = 0.75;
const CONTENTION_CONFIDENCE: f64 = 0.8;
const FORMAT_CONFIDENCE: f64 = 0.85;
const DEADLOCK_CONFIDENCE: f64 = 0.6;

const FORMAT_KEYWORDS: [&str; 5] = ["json", "parse", "schema", "format", "validation"];

const HANDOFF_TARGET_ATTRIBUTES: [&str; 2] = ["message.to_agent", "handoff.to_agent"];
const TOOL_NAME_ATTRIBUTE: &str = "tool.name";

fn chronological<'a>(spans: impl Iterator<Item = &'a Span>) -> Vec<&'a Span> {
    let mut ordered: Vec<&Span> = spans.collect();
    ordered.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.span_id.cmp(&b.span_id)));
    ordered
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

pub(super) fn infinite_loop(input: &ClassificationInput<'_>) -> Result<Vec<FailureAnnotation>, AnalysisError> {
    let mut by_agent: BTreeMap<&str, Vec<&Span>> = BTreeMap::new();
    for span in input.spans {
        if let Some(agent_id) = span.agent_id.as_deref() {
            by_agent.entry(agent_id).or_default().push(span);
        }
    }

    let mut annotations = Vec::new();
    for (agent_id, spans) in by_agent {
        // (hash, count, last span), in first-seen order.
        let mut seen: Vec<(String, usize, &Span)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for span in chronological(spans.into_iter()) {
            let Some(value) = span.input.as_ref().filter(|v| has_content(v)) else {
                continue;
            };
            let hash = content_hash(value)?;
            match index.get(&hash) {
                Some(&i) => {
                    seen[i].1 += 1;
                    seen[i].2 = span;
                }
                None => {
                    index.insert(hash.clone(), seen.len());
                    seen.push((hash, 1, span));
                }
            }
        }

        let agent_name = input.agent_name(agent_id);
        for (_, count, last) in seen {
            // The first occurrence is not a repeat.
            let repeats = count - 1;
            if repeats <= LOOP_THRESHOLD {
                continue;
            }
            let extra = (repeats - LOOP_THRESHOLD) as f64;
            let confidence =
                (LOOP_BASE_CONFIDENCE + LOOP_CONFIDENCE_STEP * extra).min(LOOP_MAX_CONFIDENCE);
            annotations.push(
                FailureAnnotation::auto(
                    input.trace_id,
                    FailureMode::InfiniteLoop,
                    confidence,
                    format!("Agent '{agent_name}' received the same input {count} times"),
                )
                .on_span(&last.span_id)
                .on_agent(Some(agent_id)),
            );
        }
    }

    Ok(annotations)
}

pub(super) fn handoff_failure(input: &ClassificationInput<'_>) -> Result<Vec<FailureAnnotation>, AnalysisError> {
    let ordered = chronological(input.spans.iter());
    let mut annotations = Vec::new();

    for handoff in ordered.iter().filter(|s| s.kind == SpanKind::Handoff) {
        let Some(target) = handoff_target(input, handoff) else {
            continue;
        };

        let next = ordered.iter().find(|s| {
            s.agent_id.as_deref() == Some(target)
                && s.start_time >= handoff.start_time
                && s.span_id != handoff.span_id
        });
        let Some(next) = next.filter(|s| s.status == SpanStatus::Error) else {
            continue;
        };

        let detail = next.error_message().unwrap_or_else(|| "no error detail".to_string());
        annotations.push(
            FailureAnnotation::auto(
                input.trace_id,
                FailureMode::HandoffFailure,
                HANDOFF_CONFIDENCE,
                format!(
                    "Agent '{}' failed right after receiving handoff '{}': {detail}",
                    input.agent_name(target),
                    handoff.name
                ),
            )
            .on_span(&next.span_id)
            .on_agent(Some(target)),
        );
    }

    Ok(annotations)
}

/// Resolves the agent id a handoff span hands control to.
fn handoff_target<'a>(input: &ClassificationInput<'a>, handoff: &Span) -> Option<&'a str> {
    let from_message = input
        .messages
        .iter()
        .find(|m| m.span_id.as_deref() == Some(handoff.span_id.as_str()))
        .map(|m| m.to_agent_id.as_str());
    if from_message.is_some() {
        return from_message;
    }

    let declared = HANDOFF_TARGET_ATTRIBUTES
        .iter()
        .find_map(|key| handoff.attributes.get(*key).and_then(Value::as_str))?;

    input
        .agents
        .iter()
        .find(|a| a.agent_id == declared || a.name == declared)
        .map(|a| a.agent_id.as_str())
}

pub(super) fn resource_contention(
    input: &ClassificationInput<'_>,
) -> Result<Vec<FailureAnnotation>, AnalysisError> {
    let mut by_tool: BTreeMap<&str, Vec<&Span>> = BTreeMap::new();
    for span in input.spans.iter().filter(|s| s.kind == SpanKind::ToolCall) {
        let tool = span
            .attributes
            .get(TOOL_NAME_ATTRIBUTE)
            .and_then(Value::as_str)
            .unwrap_or(&span.name);
        by_tool.entry(tool).or_default().push(span);
    }

    let mut annotations = Vec::new();
    for (tool, spans) in by_tool {
        let ordered = chronological(spans.into_iter());
        for (i, earlier) in ordered.iter().enumerate() {
            for later in ordered.iter().skip(i + 1) {
                if !earlier.overlaps(later) {
                    continue;
                }
                annotations.push(
                    FailureAnnotation::auto(
                        input.trace_id,
                        FailureMode::ResourceContention,
                        CONTENTION_CONFIDENCE,
                        format!(
                            "Tool '{tool}' used concurrently by spans {} and {}",
                            earlier.span_id, later.span_id
                        ),
                    )
                    .on_span(&later.span_id)
                    .on_agent(later.agent_id.as_deref()),
                );
            }
        }
    }

    Ok(annotations)
}

pub(super) fn format_error(input: &ClassificationInput<'_>) -> Result<Vec<FailureAnnotation>, AnalysisError> {
    let annotations = chronological(input.spans.iter())
        .into_iter()
        .filter_map(|span| {
            let message = span.error_message()?;
            let lowered = message.to_lowercase();
            FORMAT_KEYWORDS.iter().any(|k| lowered.contains(k)).then(|| {
                FailureAnnotation::auto(
                    input.trace_id,
                    FailureMode::FormatError,
                    FORMAT_CONFIDENCE,
                    format!("Span '{}' failed with a format error: {message}", span.name),
                )
                .on_span(&span.span_id)
                .on_agent(span.agent_id.as_deref())
            })
        })
        .collect();

    Ok(annotations)
}

pub(super) fn timeout(input: &ClassificationInput<'_>) -> Result<Vec<FailureAnnotation>, AnalysisError> {
    let cyclic = input.graph.is_some_and(|g| g.has_cycles());

    let annotations = chronological(input.spans.iter())
        .into_iter()
        .filter(|s| s.status == SpanStatus::Timeout)
        .map(|span| {
            let mut reasoning = format!("Span '{}' timed out", span.name);
            if cyclic {
                reasoning.push_str(" while agents were messaging in a cycle");
            }
            FailureAnnotation::auto(input.trace_id, FailureMode::Deadlock, DEADLOCK_CONFIDENCE, reasoning)
                .on_span(&span.span_id)
                .on_agent(span.agent_id.as_deref())
        })
        .collect();

    Ok(annotations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracelens_core::{Agent, AgentMessage, MessageType};

    fn input<'a>(
        spans: &'a [Span],
        agents: &'a [Agent],
        messages: &'a [AgentMessage],
    ) -> ClassificationInput<'a> {
        ClassificationInput { trace_id: "t", spans, agents, messages, graph: None }
    }

    fn repeated(agent: &str, times: usize) -> Vec<Span> {
        (0..times)
            .map(|i| {
                Span::new(format!("{agent}-{i}"), "t", "step", SpanKind::LlmCall, i as i64 * 10)
                    .with_agent(agent)
                    .with_input(json!({"prompt": "same"}))
            })
            .collect()
    }

    #[test]
    fn test_loop_needs_more_than_three_repeats() {
        for times in [3, 4] {
            let spans = repeated("a", times);
            assert!(infinite_loop(&input(&spans, &[], &[])).unwrap().is_empty(), "{times}");
        }
    }

    #[test]
    fn test_loop_confidence_grows_and_caps() {
        let spans = repeated("a", 5);
        let found = infinite_loop(&input(&spans, &[], &[])).unwrap();
        assert_eq!(found.len(), 1);
        assert!((found[0].confidence - 0.6).abs() < 1e-9);
        assert_eq!(found[0].span_id.as_deref(), Some("a-4"));
        assert!(found[0].reasoning.contains("5 times"));

        let spans = repeated("a", 6);
        let found = infinite_loop(&input(&spans, &[], &[])).unwrap();
        assert!((found[0].confidence - 0.7).abs() < 1e-9);

        let spans = repeated("a", 20);
        let found = infinite_loop(&input(&spans, &[], &[])).unwrap();
        assert!((found[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_loop_ignores_empty_inputs() {
        let spans: Vec<Span> = (0..6)
            .map(|i| {
                Span::new(format!("s{i}"), "t", "x", SpanKind::LlmCall, i)
                    .with_agent("a")
                    .with_input(json!(""))
            })
            .collect();
        assert!(infinite_loop(&input(&spans, &[], &[])).unwrap().is_empty());
    }

    #[test]
    fn test_handoff_failure_from_message() {
        let agents = vec![Agent::new("a", "t", "planner"), Agent::new("b", "t", "coder")];
        let spans = vec![
            Span::new("h", "t", "delegate", SpanKind::Handoff, 10).with_agent("a"),
            Span::new("b1", "t", "code", SpanKind::LlmCall, 20)
                .with_agent("b")
                .with_status(SpanStatus::Error)
                .with_error(json!("boom")),
        ];
        let messages =
            vec![AgentMessage::new("m", "t", "a", "b", MessageType::Handoff, 10).with_span("h")];

        let found = handoff_failure(&input(&spans, &agents, &messages)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].confidence, 0.75);
        assert_eq!(found[0].span_id.as_deref(), Some("b1"));
        assert_eq!(found[0].agent_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_handoff_target_from_attribute_by_name() {
        let agents = vec![Agent::new("a", "t", "planner"), Agent::new("b", "t", "coder")];
        let spans = vec![
            Span::new("h", "t", "delegate", SpanKind::Handoff, 10)
                .with_agent("a")
                .with_attribute("handoff.to_agent", json!("coder")),
            Span::new("b1", "t", "code", SpanKind::LlmCall, 20).with_agent("b"),
            Span::new("b2", "t", "code", SpanKind::LlmCall, 30)
                .with_agent("b")
                .with_status(SpanStatus::Error),
        ];

        // Only the first span after the handoff counts.
        assert!(handoff_failure(&input(&spans, &agents, &[])).unwrap().is_empty());
    }

    #[test]
    fn test_handoff_failure_in_same_millisecond() {
        let agents = vec![Agent::new("a", "t", "planner"), Agent::new("b", "t", "coder")];
        let spans = vec![
            Span::new("h", "t", "delegate", SpanKind::Handoff, 10).with_agent("a"),
            Span::new("b1", "t", "code", SpanKind::LlmCall, 10)
                .with_agent("b")
                .with_status(SpanStatus::Error),
        ];
        let messages =
            vec![AgentMessage::new("m", "t", "a", "b", MessageType::Handoff, 10).with_span("h")];

        let found = handoff_failure(&input(&spans, &agents, &messages)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].span_id.as_deref(), Some("b1"));
    }

    #[test]
    fn test_handoff_to_self_skips_the_handoff_span() {
        let agents = vec![Agent::new("a", "t", "planner")];
        let spans = vec![
            Span::new("h", "t", "retry", SpanKind::Handoff, 10)
                .with_agent("a")
                .with_status(SpanStatus::Error)
                .with_attribute("handoff.to_agent", json!("a")),
            Span::new("a1", "t", "plan", SpanKind::LlmCall, 20).with_agent("a"),
        ];
        assert!(handoff_failure(&input(&spans, &agents, &[])).unwrap().is_empty());
    }

    #[test]
    fn test_contention_with_unfinished_tool_call() {
        let spans = vec![
            Span::new("s1", "t", "search", SpanKind::ToolCall, 0).with_agent("a"),
            Span::new("s2", "t", "search", SpanKind::ToolCall, 50).with_agent("b").with_end(60),
        ];
        let found = resource_contention(&input(&spans, &[], &[])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].span_id.as_deref(), Some("s2"));
    }

    #[test]
    fn test_contention_on_overlapping_tool_calls() {
        let spans = vec![
            Span::new("s1", "t", "search", SpanKind::ToolCall, 0).with_agent("a").with_end(100),
            Span::new("s2", "t", "search", SpanKind::ToolCall, 50).with_agent("b").with_end(150),
            Span::new("s3", "t", "other", SpanKind::ToolCall, 60)
                .with_agent("c")
                .with_end(70)
                .with_attribute("tool.name", json!("search")),
            Span::new("s4", "t", "search", SpanKind::ToolCall, 500).with_agent("a").with_end(600),
        ];

        let found = resource_contention(&input(&spans, &[], &[])).unwrap();
        let flagged: Vec<&str> = found.iter().filter_map(|a| a.span_id.as_deref()).collect();
        assert_eq!(flagged, vec!["s2", "s3", "s3"]);
        assert!(found.iter().all(|a| a.confidence == 0.8));
    }

    #[test]
    fn test_format_error_keywords() {
        let spans = vec![
            Span::new("s1", "t", "x", SpanKind::LlmCall, 0)
                .with_status(SpanStatus::Error)
                .with_error(json!({"message": "Failed to PARSE response"})),
            Span::new("s2", "t", "x", SpanKind::LlmCall, 1)
                .with_status(SpanStatus::Error)
                .with_error(json!("connection reset")),
        ];
        let found = format_error(&input(&spans, &[], &[])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].failure_mode, FailureMode::FormatError);
        assert_eq!(found[0].span_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_timeout_maps_to_deadlock() {
        let spans = vec![
            Span::new("s1", "t", "wait", SpanKind::ToolCall, 0).with_status(SpanStatus::Timeout),
            Span::new("s2", "t", "ok", SpanKind::ToolCall, 1),
        ];
        let found = timeout(&input(&spans, &[], &[])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].failure_mode, FailureMode::Deadlock);
        assert_eq!(found[0].confidence, 0.6);
    }
}
