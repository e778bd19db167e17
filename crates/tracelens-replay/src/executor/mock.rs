use async_trait::async_trait;
use serde_json::{json, Value};
use tracelens_core::SpanKind;

use super::{ExecutionError, ExecutionRequest, FrameworkExecutor, MOCK_FRAMEWORK};

/// Deterministic stand-in used for dry runs. Never calls a model.
pub struct MockExecutor;

#[async_trait]
impl FrameworkExecutor for MockExecutor {
    fn framework(&self) -> &str {
        MOCK_FRAMEWORK
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<Value, ExecutionError> {
        let snapshot = &request.snapshot;
        let agent_name = snapshot.agent.as_ref().map(|a| a.name.as_str()).unwrap_or("unknown");
        let kind = snapshot.span_kind.as_str();
        let input = request.input.clone().unwrap_or(Value::Null);

        let mut response = json!({
            "mock": true,
            "agent": agent_name,
            "span_kind": kind,
            "input_echo": input,
            "message": format!("Mock execution of {agent_name} ({kind})"),
        });

        if !request.agent_overrides.is_empty() {
            response["overrides_applied"] = Value::Object(request.agent_overrides.clone());
        }

        match snapshot.span_kind {
            SpanKind::LlmCall => {
                let prompt = input
                    .get("query")
                    .or_else(|| input.get("prompt"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let model = request
                    .agent_overrides
                    .get("model")
                    .and_then(Value::as_str)
                    .or_else(|| snapshot.agent.as_ref().and_then(|a| a.model.as_deref()))
                    .unwrap_or("mock-model");
                response["content"] = json!(format!("Mock LLM response to: {prompt}"));
                response["model"] = json!(model);
                response["tokens"] = json!({"input": 10, "output": 20});
            }
            SpanKind::ToolCall => {
                response["tool_result"] = json!(format!("Mock tool result for: {input}"));
                response["success"] = json!(true);
            }
            SpanKind::Handoff => {
                response["context"] = input;
            }
            SpanKind::AgentMessage | SpanKind::Checkpoint => {
                response["output"] = json!(format!("Mock output for {kind}"));
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StateSnapshot;
    use serde_json::Map;
    use tracelens_core::Span;

    #[tokio::test]
    async fn test_mock_llm_call() {
        let span = Span::new("s", "t", "ask", SpanKind::LlmCall, 0).with_input(json!({"prompt": "hi"}));
        let snapshot = StateSnapshot::capture(&span, None, None);
        let request = ExecutionRequest {
            checkpoint_id: "c".into(),
            input: snapshot.input.clone(),
            snapshot,
            input_modified: false,
            agent_overrides: Map::new(),
        };

        let output = MockExecutor.execute(request.clone()).await.unwrap();
        assert_eq!(output["content"], json!("Mock LLM response to: hi"));
        assert_eq!(output["tokens"]["output"], json!(20));
        assert_eq!(output, MockExecutor.execute(request).await.unwrap());
    }
}
