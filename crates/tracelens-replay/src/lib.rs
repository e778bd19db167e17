//! Checkpoints and replay for tracelens.
//!
//! A [`CheckpointManager`] captures a versioned [`StateSnapshot`] at a span.
//! The [`ReplayExecutor`] re-runs a checkpoint through the
//! [`FrameworkExecutor`] registered for the agent's framework, bounded by a
//! timeout, and compares the result against the recorded output with
//! [`diff()`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracelens_replay::{ExecutorRegistry, ReplayConfig, ReplayExecutor};
//! use tracelens_store::TraceStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(TraceStore::new("data/tracelens.db")?);
//! let executor = ReplayExecutor::new(store, Arc::new(ExecutorRegistry::with_builtins()));
//!
//! let result = executor.replay("trace-1:span-3:0a1b2c3d4e5f6a7b", ReplayConfig::default().dry_run()).await?;
//! if let Some(diff) = &result.diff {
//!     println!("{}", diff.format_for_display());
//! }
//! # Ok(())
//! # }
//! ```

mod checkpoint;
pub mod diff;
mod error;
pub mod executor;
mod replay;
mod snapshot;

pub use checkpoint::{
    checkpoint_id, AutoCheckpointReport, Checkpoint, CheckpointCandidate, CheckpointManager,
    SavedCheckpoint,
};
pub use diff::{diff, Diff, TypeChange, ValueChange};
pub use error::{CheckpointError, ReplayError};
pub use executor::{
    ExecutionError, ExecutionRequest, ExecutorRegistry, FrameworkExecutor, GenericExecutor,
    MockExecutor,
};
pub use replay::{ReplayConfig, ReplayExecutor, ReplayResult, DEFAULT_REPLAY_TIMEOUT, TIMEOUT_MESSAGE};
pub use snapshot::{AgentState, SnapshotError, StateSnapshot, SNAPSHOT_SCHEMA_VERSION};
