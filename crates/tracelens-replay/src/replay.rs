//! Timed replay from a checkpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracelens_core::now_ms;
use tracelens_store::{ReplayRecord, TraceStore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::checkpoint::CheckpointManager;
use crate::diff::{diff, Diff};
use crate::error::ReplayError;
use crate::executor::{ExecutionRequest, ExecutorRegistry, GENERIC_FRAMEWORK, MOCK_FRAMEWORK};

pub const DEFAULT_REPLAY_TIMEOUT: Duration = Duration::from_secs(300);

/// Error message recorded when a replay exceeds its time limit.
pub const TIMEOUT_MESSAGE: &str = "replay timed out";

/// How to run one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Replaces the checkpointed input.
    pub modified_input: Option<Value>,
    #[serde(default)]
    pub agent_overrides: Map<String, Value>,
    #[serde(with = "duration_secs", rename = "timeout_seconds", default = "default_timeout")]
    pub timeout: Duration,
    /// Run the `mock` executor instead of the agent's framework.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_timeout() -> Duration {
    DEFAULT_REPLAY_TIMEOUT
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            modified_input: None,
            agent_overrides: Map::new(),
            timeout: DEFAULT_REPLAY_TIMEOUT,
            dry_run: false,
        }
    }
}

impl ReplayConfig {
    pub fn with_input(mut self, input: Value) -> Self {
        self.modified_input = Some(input);
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: Value) -> Self {
        self.agent_overrides.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Outcome of one replay. Failures are recorded here, not raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub replay_id: String,
    pub checkpoint_id: String,
    pub trace_id: String,
    pub framework: String,
    pub original_output: Option<Value>,
    pub output: Option<Value>,
    pub diff: Option<Diff>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub tokens_used: Option<u64>,
    pub cost_usd: Option<f64>,
    pub created_at: i64,
}

impl ReplayResult {
    fn from_record(record: ReplayRecord) -> Result<Self, ReplayError> {
        let framework = record
            .config
            .get("framework")
            .and_then(Value::as_str)
            .unwrap_or(GENERIC_FRAMEWORK)
            .to_string();
        let diff = record.diff.map(serde_json::from_value).transpose()?;

        Ok(Self {
            replay_id: record.replay_id,
            checkpoint_id: record.checkpoint_id,
            trace_id: record.trace_id,
            framework,
            original_output: record.original_output,
            output: record.replay_output,
            diff,
            success: record.success,
            error: record.error,
            duration_ms: record.duration_ms,
            tokens_used: record.tokens_used,
            cost_usd: record.cost_usd,
            created_at: record.created_at,
        })
    }
}

/// Loads checkpoints, runs executors under a timeout and records history.
pub struct ReplayExecutor {
    store: Arc<TraceStore>,
    checkpoints: CheckpointManager,
    registry: Arc<ExecutorRegistry>,
}

impl ReplayExecutor {
    pub fn new(store: Arc<TraceStore>, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            checkpoints: CheckpointManager::new(store.clone()),
            store,
            registry,
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Replays from a checkpoint.
    ///
    /// Missing checkpoint, span or executor are errors. A timeout or a
    /// failing executor produces a result with `success == false`.
    pub async fn replay(
        &self,
        checkpoint_id: &str,
        config: ReplayConfig,
    ) -> Result<ReplayResult, ReplayError> {
        let checkpoint = self.checkpoints.load(checkpoint_id)?;
        let original_output = self
            .store
            .get_span(&checkpoint.span_id)?
            .ok_or_else(|| ReplayError::SpanNotFound(checkpoint.span_id.clone()))?
            .output;

        let framework = if config.dry_run {
            MOCK_FRAMEWORK
        } else {
            checkpoint.state.framework().unwrap_or(GENERIC_FRAMEWORK)
        }
        .to_string();
        let executor = self
            .registry
            .get(&framework)
            .ok_or_else(|| ReplayError::NoExecutorRegistered(framework.clone()))?;

        let input_modified = config.modified_input.is_some();
        let request = ExecutionRequest {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            input: config.modified_input.clone().or_else(|| checkpoint.state.input.clone()),
            input_modified,
            agent_overrides: config.agent_overrides.clone(),
            snapshot: checkpoint.state.clone(),
        };

        info!(checkpoint_id, framework = %framework, "Starting replay");
        let started = Instant::now();

        let task = tokio::spawn(async move { executor.execute(request).await });
        let abort = task.abort_handle();
        let outcome = match tokio::time::timeout(config.timeout, task).await {
            Err(_) => {
                abort.abort();
                Err(TIMEOUT_MESSAGE.to_string())
            }
            Ok(Err(join_err)) => Err(panic_message(join_err)),
            Ok(Ok(Err(exec_err))) => Err(exec_err.to_string()),
            Ok(Ok(Ok(output))) => Ok(output),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (output, error) = match outcome {
            Ok(output) => (Some(output), None),
            Err(message) => {
                warn!(checkpoint_id, error = %message, "Replay failed");
                (None, Some(message))
            }
        };

        let diff = output
            .as_ref()
            .map(|out| diff(original_output.as_ref().unwrap_or(&Value::Null), out));
        let (tokens_used, cost_usd) = output.as_ref().map(usage_from_output).unwrap_or_default();

        let result = ReplayResult {
            replay_id: format!("replay-{}", Uuid::new_v4()),
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            trace_id: checkpoint.trace_id.clone(),
            framework,
            original_output,
            success: output.is_some(),
            output,
            diff,
            error,
            duration_ms,
            tokens_used,
            cost_usd,
            created_at: now_ms(),
        };

        self.record(&result, &config)?;
        info!(
            replay_id = %result.replay_id,
            success = result.success,
            duration_ms,
            "Replay finished"
        );

        Ok(result)
    }

    fn record(&self, result: &ReplayResult, config: &ReplayConfig) -> Result<(), ReplayError> {
        let mut stored_config = serde_json::to_value(config)?;
        stored_config["framework"] = Value::String(result.framework.clone());

        self.store.insert_replay(&ReplayRecord {
            replay_id: result.replay_id.clone(),
            checkpoint_id: result.checkpoint_id.clone(),
            trace_id: result.trace_id.clone(),
            config: stored_config,
            original_output: result.original_output.clone(),
            replay_output: result.output.clone(),
            diff: result.diff.as_ref().map(serde_json::to_value).transpose()?,
            success: result.success,
            error: result.error.clone(),
            duration_ms: result.duration_ms,
            tokens_used: result.tokens_used,
            cost_usd: result.cost_usd,
            created_at: result.created_at,
        })?;
        self.store.record_checkpoint_replay(&result.checkpoint_id, result.created_at)?;
        Ok(())
    }

    pub fn get_replay(&self, replay_id: &str) -> Result<ReplayResult, ReplayError> {
        let record = self
            .store
            .get_replay(replay_id)?
            .ok_or_else(|| ReplayError::ReplayNotFound(replay_id.to_string()))?;
        ReplayResult::from_record(record)
    }

    /// Replays of a trace, newest first.
    pub fn replays_for_trace(&self, trace_id: &str) -> Result<Vec<ReplayResult>, ReplayError> {
        self.store
            .list_replays_for_trace(trace_id)?
            .into_iter()
            .map(ReplayResult::from_record)
            .collect()
    }

    /// Replays of a checkpoint, newest first.
    pub fn replays_for_checkpoint(&self, checkpoint_id: &str) -> Result<Vec<ReplayResult>, ReplayError> {
        self.store
            .list_replays_for_checkpoint(checkpoint_id)?
            .into_iter()
            .map(ReplayResult::from_record)
            .collect()
    }
}

/// Token and cost figures an executor reported in its output.
fn usage_from_output(output: &Value) -> (Option<u64>, Option<f64>) {
    let tokens = output.get("tokens").and_then(Value::as_object).map(|t| {
        let count = |key: &str| t.get(key).and_then(Value::as_u64).unwrap_or(0);
        count("input") + count("output")
    });
    let cost = output.get("cost_usd").and_then(Value::as_f64);
    (tokens, cost)
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return format!("executor task failed: {err}");
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map(|msg| format!("executor panicked: {msg}"))
        .unwrap_or_else(|| "executor panicked".to_string())
}
