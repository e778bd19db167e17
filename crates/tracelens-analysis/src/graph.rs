//! Agent communication graph.
//!
//! Nodes are the agents of one trace, edges aggregate every message sent
//! between an ordered pair of agents. The graph is derived on demand and
//! never stored.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracelens_core::{Agent, AgentMessage, MessageType, Span, SpanStatus};

use crate::error::AnalysisError;

// ─────────────────────────────────────────────────────────────────────────────
// Graph Types
// ─────────────────────────────────────────────────────────────────────────────

/// One agent plus metrics derived from its spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentGraphNode {
    pub id: String,
    pub name: String,
    pub role: Option<String>,
    pub model: Option<String>,
    pub span_count: u32,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub error_count: u32,
    /// Mean duration of the agent's finished spans.
    pub avg_latency_ms: Option<f64>,
}

/// All messages from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentGraphEdge {
    pub source: String,
    pub target: String,
    pub message_count: u32,
    /// Distinct message types, sorted.
    pub message_types: Vec<MessageType>,
    /// Mean time from a message to the recipient's next span start.
    /// `None` when no message was followed by a recipient span.
    pub avg_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub has_cycles: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentGraph {
    pub nodes: Vec<AgentGraphNode>,
    pub edges: Vec<AgentGraphEdge>,
    pub metrics: GraphMetrics,
}

/// Simple paths between two agents, expressed as agent names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPaths {
    pub from: String,
    pub to: String,
    pub paths: Vec<Vec<String>>,
    pub shortest: Option<Vec<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct EdgeAccumulator {
    count: u32,
    types: BTreeSet<MessageType>,
    latency_sum: f64,
    latency_samples: u32,
}

impl AgentGraph {
    /// Builds the graph from one trace's records.
    ///
    /// Messages whose endpoints are not both agents of `agents` are ignored.
    pub fn build(agents: &[Agent], spans: &[Span], messages: &[AgentMessage]) -> Self {
        let nodes: Vec<AgentGraphNode> = agents.iter().map(|a| node_for(a, spans)).collect();

        let known: BTreeSet<&str> = agents.iter().map(|a| a.agent_id.as_str()).collect();

        // Recipient span starts, sorted, for downstream latency lookups.
        let mut starts: HashMap<&str, Vec<i64>> = HashMap::new();
        for span in spans {
            if let Some(agent_id) = span.agent_id.as_deref() {
                starts.entry(agent_id).or_default().push(span.start_time);
            }
        }
        for list in starts.values_mut() {
            list.sort_unstable();
        }

        let mut accumulators: BTreeMap<(&str, &str), EdgeAccumulator> = BTreeMap::new();
        for message in messages {
            let (from, to) = (message.from_agent_id.as_str(), message.to_agent_id.as_str());
            if !known.contains(from) || !known.contains(to) {
                continue;
            }

            let acc = accumulators.entry((from, to)).or_default();
            acc.count += 1;
            acc.types.insert(message.message_type);

            let next_start = starts.get(to).and_then(|list| {
                let idx = list.partition_point(|&start| start < message.timestamp);
                list.get(idx).copied()
            });
            if let Some(start) = next_start {
                acc.latency_sum += (start - message.timestamp) as f64;
                acc.latency_samples += 1;
            }
        }

        let edges: Vec<AgentGraphEdge> = accumulators
            .into_iter()
            .map(|((source, target), acc)| AgentGraphEdge {
                source: source.to_string(),
                target: target.to_string(),
                message_count: acc.count,
                message_types: acc.types.into_iter().collect(),
                avg_latency_ms: (acc.latency_samples > 0)
                    .then(|| acc.latency_sum / acc.latency_samples as f64),
            })
            .collect();

        let node_count = nodes.len();
        let edge_count = edges.len();
        let density = if node_count > 1 {
            edge_count as f64 / (node_count * (node_count - 1)) as f64
        } else {
            0.0
        };

        let mut graph = Self {
            nodes,
            edges,
            metrics: GraphMetrics { node_count, edge_count, density, has_cycles: false },
        };
        graph.metrics.has_cycles = graph.detect_cycle();
        graph
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, agent_id: &str) -> Option<&AgentGraphNode> {
        self.nodes.iter().find(|n| n.id == agent_id)
    }

    fn node_by_name(&self, name: &str) -> Option<&AgentGraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Outgoing neighbors per node, sorted.
    fn adjacency(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut adj: BTreeMap<&str, Vec<&str>> =
            self.nodes.iter().map(|n| (n.id.as_str(), Vec::new())).collect();
        for edge in &self.edges {
            adj.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        }
        for targets in adj.values_mut() {
            targets.sort_unstable();
        }
        adj
    }

    pub fn in_degree(&self, agent_id: &str) -> usize {
        self.edges.iter().filter(|e| e.target == agent_id).count()
    }

    pub fn out_degree(&self, agent_id: &str) -> usize {
        self.edges.iter().filter(|e| e.source == agent_id).count()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Agents receiving from more than twice the mean number of senders.
    pub fn bottlenecks(&self) -> Vec<&AgentGraphNode> {
        if self.nodes.is_empty() {
            return Vec::new();
        }
        let mean = self.edges.len() as f64 / self.nodes.len() as f64;
        self.nodes
            .iter()
            .filter(|n| self.in_degree(&n.id) as f64 > 2.0 * mean)
            .collect()
    }

    /// Agents that neither sent nor received a message.
    pub fn isolated_agents(&self) -> Vec<&AgentGraphNode> {
        self.nodes
            .iter()
            .filter(|n| self.in_degree(&n.id) + self.out_degree(&n.id) == 0)
            .collect()
    }

    pub fn has_cycles(&self) -> bool {
        self.metrics.has_cycles
    }

    fn detect_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let adj = self.adjacency();
        let mut marks: HashMap<&str, Mark> = adj.keys().map(|k| (*k, Mark::Unvisited)).collect();

        for &root in adj.keys() {
            if marks.get(root) != Some(&Mark::Unvisited) {
                continue;
            }
            // Iterative DFS: (node, index of next neighbor to visit).
            let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::InProgress);

            while let Some((node, next)) = stack.pop() {
                let neighbors = adj.get(node).map(Vec::as_slice).unwrap_or_default();
                let Some(&neighbor) = neighbors.get(next) else {
                    marks.insert(node, Mark::Done);
                    continue;
                };
                stack.push((node, next + 1));
                match marks.get(neighbor).copied().unwrap_or(Mark::Unvisited) {
                    Mark::InProgress => return true,
                    Mark::Unvisited => {
                        marks.insert(neighbor, Mark::InProgress);
                        stack.push((neighbor, 0));
                    }
                    Mark::Done => {}
                }
            }
        }

        false
    }

    /// All simple directed paths between two agents, looked up by name.
    ///
    /// Identical endpoints yield no paths.
    pub fn paths(&self, from_name: &str, to_name: &str) -> Result<AgentPaths, AnalysisError> {
        let from = self
            .node_by_name(from_name)
            .ok_or_else(|| AnalysisError::AgentNotFound(from_name.to_string()))?;
        let to = self
            .node_by_name(to_name)
            .ok_or_else(|| AnalysisError::AgentNotFound(to_name.to_string()))?;

        let mut result = AgentPaths {
            from: from_name.to_string(),
            to: to_name.to_string(),
            paths: Vec::new(),
            shortest: None,
        };
        if from.id == to.id {
            return Ok(result);
        }

        let adj = self.adjacency();
        let mut id_paths: Vec<Vec<&str>> = Vec::new();
        let mut current = vec![from.id.as_str()];
        collect_simple_paths(&adj, to.id.as_str(), &mut current, &mut id_paths);

        let shortest_ids = shortest_path(&adj, from.id.as_str(), to.id.as_str());

        let names: HashMap<&str, &str> =
            self.nodes.iter().map(|n| (n.id.as_str(), n.name.as_str())).collect();
        let to_names = |ids: &[&str]| -> Vec<String> {
            ids.iter().map(|id| names.get(id).copied().unwrap_or(*id).to_string()).collect()
        };

        result.paths = id_paths.iter().map(|p| to_names(p.as_slice())).collect();
        result.shortest = shortest_ids.map(|p| to_names(p.as_slice()));
        Ok(result)
    }
}

fn node_for(agent: &Agent, spans: &[Span]) -> AgentGraphNode {
    let own: Vec<&Span> = spans
        .iter()
        .filter(|s| s.agent_id.as_deref() == Some(agent.agent_id.as_str()))
        .collect();

    let durations: Vec<i64> = own.iter().filter_map(|s| s.duration_ms()).collect();
    let avg_latency_ms = (!durations.is_empty())
        .then(|| durations.iter().sum::<i64>() as f64 / durations.len() as f64);

    AgentGraphNode {
        id: agent.agent_id.clone(),
        name: agent.name.clone(),
        role: agent.role.clone(),
        model: agent.model.clone(),
        span_count: own.len() as u32,
        total_tokens: own.iter().map(|s| s.total_tokens()).sum(),
        total_cost_usd: own.iter().map(|s| s.cost_usd).sum(),
        error_count: own.iter().filter(|s| s.status == SpanStatus::Error).count() as u32,
        avg_latency_ms,
    }
}

fn collect_simple_paths<'a>(
    adj: &BTreeMap<&'a str, Vec<&'a str>>,
    target: &'a str,
    current: &mut Vec<&'a str>,
    out: &mut Vec<Vec<&'a str>>,
) {
    let Some(&last) = current.last() else { return };
    let Some(neighbors) = adj.get(last) else { return };

    for &next in neighbors {
        if current.contains(&next) {
            continue;
        }
        current.push(next);
        if next == target {
            out.push(current.clone());
        } else {
            collect_simple_paths(adj, target, current, out);
        }
        current.pop();
    }
}

fn shortest_path<'a>(
    adj: &BTreeMap<&'a str, Vec<&'a str>>,
    from: &'a str,
    to: &'a str,
) -> Option<Vec<&'a str>> {
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([from]);

    while let Some(node) = queue.pop_front() {
        for &next in adj.get(node).map(Vec::as_slice).unwrap_or_default() {
            if next == from || parent.contains_key(next) {
                continue;
            }
            parent.insert(next, node);
            if next == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&prev) = parent.get(cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }

    None
}
