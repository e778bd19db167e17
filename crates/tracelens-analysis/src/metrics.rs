//! Aggregate metrics for one trace.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracelens_core::{Agent, Span, SpanStatus};

/// Per-agent totals, keyed by agent name in [`TraceMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub span_count: u32,
    pub tokens: u64,
    pub cost_usd: f64,
    /// Mean duration of finished spans.
    pub avg_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMetrics {
    pub trace_id: String,
    /// Latest span end minus earliest span start.
    pub total_duration_ms: Option<i64>,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub agent_count: usize,
    pub span_count: usize,
    pub error_count: usize,
    pub agents: BTreeMap<String, AgentMetrics>,
}

impl TraceMetrics {
    pub fn compute(trace_id: &str, agents: &[Agent], spans: &[Span]) -> Self {
        let start = spans.iter().map(|s| s.start_time).min();
        let end = spans.iter().filter_map(|s| s.end_time).max();
        let total_duration_ms = match (start, end) {
            (Some(start), Some(end)) => Some((end - start).max(0)),
            _ => None,
        };

        let names: HashMap<&str, &str> =
            agents.iter().map(|a| (a.agent_id.as_str(), a.name.as_str())).collect();

        let mut per_agent: BTreeMap<String, (AgentMetrics, i64, u32)> = agents
            .iter()
            .map(|a| (a.name.clone(), (AgentMetrics::default(), 0, 0)))
            .collect();

        for span in spans {
            let Some(name) = span.agent_id.as_deref().and_then(|id| names.get(id)) else {
                continue;
            };
            let Some((metrics, duration_sum, finished)) = per_agent.get_mut(*name) else {
                continue;
            };
            metrics.span_count += 1;
            metrics.tokens += span.total_tokens();
            metrics.cost_usd += span.cost_usd;
            if let Some(duration) = span.duration_ms() {
                *duration_sum += duration;
                *finished += 1;
            }
        }

        let agents_out = per_agent
            .into_iter()
            .map(|(name, (mut metrics, duration_sum, finished))| {
                metrics.avg_latency_ms =
                    (finished > 0).then(|| duration_sum as f64 / finished as f64);
                (name, metrics)
            })
            .collect();

        Self {
            trace_id: trace_id.to_string(),
            total_duration_ms,
            total_tokens: spans.iter().map(|s| s.total_tokens()).sum(),
            total_cost_usd: spans.iter().map(|s| s.cost_usd).sum(),
            agent_count: agents.len(),
            span_count: spans.len(),
            error_count: spans.iter().filter(|s| s.status == SpanStatus::Error).count(),
            agents: agents_out,
        }
    }
}
