use std::sync::Arc;
use std::time::Duration;

use tracelens_analysis::TraceAnalyzer;
use tracelens_config::Settings;
use tracelens_replay::{CheckpointManager, ExecutorRegistry, ReplayExecutor};
use tracelens_store::TraceStore;
use tracing::info;

pub struct ServerState {
    pub analyzer: TraceAnalyzer,
    pub checkpoints: CheckpointManager,
    pub replays: ReplayExecutor,
    /// Used when a replay request gives no timeout.
    pub replay_timeout: Duration,
}

impl ServerState {
    pub fn new(settings: &Settings, store: Arc<TraceStore>, registry: Arc<ExecutorRegistry>) -> Self {
        info!("Replay executors: {:?}", registry.frameworks());

        Self {
            analyzer: TraceAnalyzer::new(store.clone()),
            checkpoints: CheckpointManager::new(store.clone()),
            replays: ReplayExecutor::new(store, registry),
            replay_timeout: settings.replay_timeout(),
        }
    }
}
