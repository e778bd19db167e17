use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ExecutionError, ExecutionRequest, FrameworkExecutor, GENERIC_FRAMEWORK};

/// Fallback for frameworks without a dedicated executor.
///
/// Returns the recorded output. When the input or agent config was changed
/// the output is wrapped with a note that nothing was re-run.
pub struct GenericExecutor;

#[async_trait]
impl FrameworkExecutor for GenericExecutor {
    fn framework(&self) -> &str {
        GENERIC_FRAMEWORK
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<Value, ExecutionError> {
        let recorded = request.snapshot.output.clone().unwrap_or(Value::Null);

        if !request.input_modified && request.agent_overrides.is_empty() {
            return Ok(recorded);
        }

        let mut result = json!({
            "output": recorded,
            "note": "Generic executor: returned original output without re-execution",
        });

        let mut warnings = Vec::new();
        if request.input_modified {
            warnings.push("Input was modified but the agent was not re-executed.");
            result["input_changes"] = json!({
                "original": request.snapshot.input,
                "modified": request.input,
            });
        }
        if !request.agent_overrides.is_empty() {
            warnings.push("Overrides were specified but not applied.");
            result["overrides_ignored"] = Value::Object(request.agent_overrides);
        }
        result["warning"] = json!(warnings.join(" "));

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StateSnapshot;
    use serde_json::Map;
    use tracelens_core::{Span, SpanKind};

    fn request(input: Value, modified: bool) -> ExecutionRequest {
        let span = Span::new("s", "t", "x", SpanKind::ToolCall, 0)
            .with_input(json!({"q": "a"}))
            .with_output(json!({"answer": 42}));
        ExecutionRequest {
            checkpoint_id: "c".into(),
            snapshot: StateSnapshot::capture(&span, None, None),
            input: Some(input),
            input_modified: modified,
            agent_overrides: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_unchanged_returns_recorded_output() {
        let output = GenericExecutor.execute(request(json!({"q": "a"}), false)).await.unwrap();
        assert_eq!(output, json!({"answer": 42}));
    }

    #[tokio::test]
    async fn test_modified_input_is_annotated() {
        let output = GenericExecutor.execute(request(json!({"q": "b"}), true)).await.unwrap();
        assert_eq!(output["output"], json!({"answer": 42}));
        assert_eq!(output["input_changes"]["modified"], json!({"q": "b"}));
        assert!(output["warning"].as_str().unwrap().contains("not re-executed"));
    }
}
