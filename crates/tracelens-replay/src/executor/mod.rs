//! Framework-specific re-execution.
//!
//! The replay executor never runs agent code itself. It hands an
//! [`ExecutionRequest`] to the [`FrameworkExecutor`] registered for the
//! checkpoint's framework.

mod generic;
mod mock;

pub use generic::GenericExecutor;
pub use mock::MockExecutor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::snapshot::StateSnapshot;

/// Framework used when the captured agent declares none.
pub const GENERIC_FRAMEWORK: &str = "generic";
/// Framework used for dry runs.
pub const MOCK_FRAMEWORK: &str = "mock";

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Unsupported snapshot: {0}")]
    Unsupported(String),
}

/// Input handed to a framework executor.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub checkpoint_id: String,
    pub snapshot: StateSnapshot,
    /// Replacement input if one was given, otherwise the recorded input.
    pub input: Option<Value>,
    pub input_modified: bool,
    pub agent_overrides: Map<String, Value>,
}

/// Re-runs one checkpointed span for a specific agent framework.
#[async_trait]
pub trait FrameworkExecutor: Send + Sync {
    fn framework(&self) -> &str;

    async fn execute(&self, request: ExecutionRequest) -> Result<Value, ExecutionError>;
}

/// Executors keyed by framework name.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn FrameworkExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `mock` and `generic` executors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MockExecutor));
        registry.register(Arc::new(GenericExecutor));
        registry
    }

    /// Adds an executor, replacing any previous one for the same framework.
    pub fn register(&mut self, executor: Arc<dyn FrameworkExecutor>) {
        self.executors.insert(executor.framework().to_string(), executor);
    }

    pub fn get(&self, framework: &str) -> Option<Arc<dyn FrameworkExecutor>> {
        self.executors.get(framework).cloned()
    }

    pub fn frameworks(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
