use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracelens_analysis::TraceAnalyzer;
use tracelens_core::{
    Agent, AgentMessage, FailureMode, MessageType, Span, SpanKind, SpanStatus, TraceRecord,
    TraceStatus,
};
use tracelens_replay::{
    CheckpointManager, ExecutionError, ExecutionRequest, ExecutorRegistry, FrameworkExecutor,
    ReplayConfig, ReplayError, ReplayExecutor, TIMEOUT_MESSAGE,
};
use tracelens_store::TraceStore;

struct HangingExecutor;

#[async_trait]
impl FrameworkExecutor for HangingExecutor {
    fn framework(&self) -> &str {
        "hanging"
    }

    async fn execute(&self, _request: ExecutionRequest) -> Result<Value, ExecutionError> {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    }
}

struct FailingExecutor;

#[async_trait]
impl FrameworkExecutor for FailingExecutor {
    fn framework(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _request: ExecutionRequest) -> Result<Value, ExecutionError> {
        Err(ExecutionError::Failed("model refused".into()))
    }
}

struct PanickingExecutor;

#[async_trait]
impl FrameworkExecutor for PanickingExecutor {
    fn framework(&self) -> &str {
        "panicking"
    }

    async fn execute(&self, _request: ExecutionRequest) -> Result<Value, ExecutionError> {
        panic!("executor bug");
    }
}

/// One trace: planner hands off to coder, coder's LLM call fails on JSON.
fn seeded_store(coder_framework: Option<&str>) -> Arc<TraceStore> {
    let store = Arc::new(TraceStore::in_memory().unwrap());
    store
        .insert_trace(&TraceRecord::new("t1", 0, TraceStatus::Failed).with_name("checkout bug"))
        .unwrap();

    store
        .insert_agent(&Agent::new("planner", "t1", "planner").with_model("gpt-4o"))
        .unwrap();
    let mut coder = Agent::new("coder", "t1", "coder").with_config("temperature", json!(0.2));
    if let Some(framework) = coder_framework {
        coder = coder.with_framework(framework);
    }
    store.insert_agent(&coder).unwrap();
    store.insert_agent(&Agent::new("idle", "t1", "idle")).unwrap();

    store
        .insert_span(
            &Span::new("p1", "t1", "plan", SpanKind::LlmCall, 100)
                .with_agent("planner")
                .with_end(200)
                .with_input(json!({"prompt": "fix checkout"}))
                .with_output(json!({"steps": ["a", "b"]})),
        )
        .unwrap();
    store
        .insert_span(
            &Span::new("h1", "t1", "delegate", SpanKind::Handoff, 210)
                .with_agent("planner")
                .with_end(220),
        )
        .unwrap();
    store
        .insert_span(
            &Span::new("c1", "t1", "write_patch", SpanKind::LlmCall, 250)
                .with_agent("coder")
                .with_end(400)
                .with_status(SpanStatus::Error)
                .with_input(json!({"prompt": "write patch"}))
                .with_output(json!({"patch": "diff --git", "files": ["cart.rs", "pay.rs"]}))
                .with_error(json!({"message": "JSON parse error at line 3"})),
        )
        .unwrap();

    store
        .insert_message(
            &AgentMessage::new("m1", "t1", "planner", "coder", MessageType::Handoff, 215)
                .with_span("h1")
                .with_content(json!({"task": "patch"})),
        )
        .unwrap();
    store
        .insert_message(&AgentMessage::new("m2", "t1", "coder", "planner", MessageType::Response, 410))
        .unwrap();

    store
}

fn registry() -> Arc<ExecutorRegistry> {
    let mut registry = ExecutorRegistry::with_builtins();
    registry.register(Arc::new(HangingExecutor));
    registry.register(Arc::new(FailingExecutor));
    registry.register(Arc::new(PanickingExecutor));
    Arc::new(registry)
}

fn coder_checkpoint(store: &Arc<TraceStore>) -> String {
    let report = CheckpointManager::new(store.clone()).auto_checkpoint("t1").unwrap();
    report
        .checkpoint_ids
        .into_iter()
        .find(|id| id.starts_with("t1:c1:"))
        .unwrap()
}

#[tokio::test]
async fn test_unmodified_generic_replay_has_no_changes() {
    let store = seeded_store(None);
    let checkpoint_id = coder_checkpoint(&store);
    let executor = ReplayExecutor::new(store.clone(), registry());

    let result = executor.replay(&checkpoint_id, ReplayConfig::default()).await.unwrap();

    assert!(result.success);
    assert_eq!(result.framework, "generic");
    assert!(result.error.is_none());
    let diff = result.diff.as_ref().unwrap();
    assert!(!diff.has_changes);

    let checkpoint = store.get_checkpoint(&checkpoint_id).unwrap().unwrap();
    assert_eq!(checkpoint.replay_count, 1);
    assert!(checkpoint.last_replayed.is_some());

    let history = executor.replays_for_checkpoint(&checkpoint_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], result);
}

#[tokio::test]
async fn test_modified_input_through_generic_shows_changes() {
    let store = seeded_store(None);
    let checkpoint_id = coder_checkpoint(&store);
    let executor = ReplayExecutor::new(store, registry());

    let config = ReplayConfig::default().with_input(json!({"prompt": "write a smaller patch"}));
    let result = executor.replay(&checkpoint_id, config).await.unwrap();

    assert!(result.success);
    let diff = result.diff.unwrap();
    assert!(diff.has_changes);
    assert!(diff.added.contains(&"output".to_string()));
    assert!(diff.removed.contains(&"patch".to_string()));
}

#[tokio::test]
async fn test_timeout_is_recorded_not_raised() {
    let store = seeded_store(Some("hanging"));
    let checkpoint_id = coder_checkpoint(&store);
    let executor = ReplayExecutor::new(store, registry());

    let config = ReplayConfig::default().with_timeout(Duration::from_secs(1));
    let result = executor.replay(&checkpoint_id, config).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(TIMEOUT_MESSAGE));
    assert!(result.output.is_none());
    assert!(result.diff.is_none());
    assert!(result.duration_ms >= 1_000);

    let stored = executor.get_replay(&result.replay_id).unwrap();
    assert_eq!(stored.error.as_deref(), Some("replay timed out"));
}

#[tokio::test]
async fn test_executor_error_and_panic_are_data() {
    for framework in ["failing", "panicking"] {
        let store = seeded_store(Some(framework));
        let checkpoint_id = coder_checkpoint(&store);
        let executor = ReplayExecutor::new(store, registry());

        let result = executor.replay(&checkpoint_id, ReplayConfig::default()).await.unwrap();
        assert!(!result.success, "{framework}");
        assert!(result.output.is_none());
        assert!(result.error.is_some());
    }
}

#[tokio::test]
async fn test_missing_executor_and_checkpoint_are_errors() {
    let store = seeded_store(Some("autogen"));
    let checkpoint_id = coder_checkpoint(&store);
    let executor = ReplayExecutor::new(store.clone(), registry());

    let err = executor.replay(&checkpoint_id, ReplayConfig::default()).await.unwrap_err();
    assert!(matches!(err, ReplayError::NoExecutorRegistered(ref f) if f == "autogen"));

    let err = executor.replay("t1:nope:0000", ReplayConfig::default()).await.unwrap_err();
    assert!(err.is_not_found());

    assert!(executor.replays_for_trace("t1").unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_uses_mock_and_reports_usage() {
    let store = seeded_store(Some("autogen"));
    let checkpoint_id = coder_checkpoint(&store);
    let executor = ReplayExecutor::new(store, registry());

    let result = executor
        .replay(&checkpoint_id, ReplayConfig::default().dry_run())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.framework, "mock");
    assert_eq!(result.tokens_used, Some(30));
    assert_eq!(result.output.as_ref().unwrap()["mock"], json!(true));
    assert!(result.diff.unwrap().has_changes);
}

#[tokio::test]
async fn test_history_is_newest_first_per_trace() {
    let store = seeded_store(None);
    let checkpoint_id = coder_checkpoint(&store);
    let executor = ReplayExecutor::new(store.clone(), registry());

    let first = executor.replay(&checkpoint_id, ReplayConfig::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = executor.replay(&checkpoint_id, ReplayConfig::default()).await.unwrap();

    let history = executor.replays_for_trace("t1").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].replay_id, second.replay_id);
    assert_eq!(history[1].replay_id, first.replay_id);
    assert_eq!(store.get_checkpoint(&checkpoint_id).unwrap().unwrap().replay_count, 2);
}

#[test]
fn test_analysis_over_the_same_trace() {
    let store = seeded_store(None);
    let analyzer = TraceAnalyzer::new(store.clone());

    let graph = analyzer.graph("t1").unwrap();
    assert_eq!(graph.metrics.node_count, 3);
    assert_eq!(graph.metrics.edge_count, 2);
    let total: u32 = graph.edges.iter().map(|e| e.message_count).sum();
    assert_eq!(total, 2);
    assert!(graph.has_cycles());
    assert_eq!(graph.isolated_agents().len(), 1);

    let annotations = analyzer.classify("t1").unwrap();
    let modes: Vec<FailureMode> = annotations.iter().map(|a| a.failure_mode).collect();
    assert_eq!(modes, vec![FailureMode::FormatError, FailureMode::HandoffFailure]);
    let handoff = &annotations[1];
    assert_eq!(handoff.span_id.as_deref(), Some("c1"));
    assert_eq!(handoff.confidence, 0.75);

    assert_eq!(analyzer.classify("t1").unwrap(), annotations);
}
