mod dto;
mod error;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracelens_analysis::TraceAnalyzer;
use tracelens_config::Settings;
use tracelens_replay::ExecutorRegistry;
use tracelens_store::TraceStore;
use tracing::{info, warn};

use crate::state::ServerState;

const CLASSIFY_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env().context("invalid settings")?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&settings.log_filter))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let store = Arc::new(
        TraceStore::new(&settings.database_path)
            .with_context(|| format!("failed to open {}", settings.database_path.display()))?,
    );
    info!("Trace store at {}", settings.database_path.display());

    if settings.auto_classify_batch > 0 {
        spawn_batch_classifier(store.clone(), settings.auto_classify_batch);
    }

    let registry = Arc::new(ExecutorRegistry::with_builtins());
    let state = Arc::new(ServerState::new(&settings, store, registry));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let app = routes::router(state).layer(trace_layer).layer(cors);

    info!("Starting server on {}", settings.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically classifies failed traces that have no annotations yet.
fn spawn_batch_classifier(store: Arc<TraceStore>, batch: u32) {
    info!("Batch classification every {:?}, {} traces per run", CLASSIFY_INTERVAL, batch);

    tokio::spawn(async move {
        let analyzer = TraceAnalyzer::new(store);
        let mut interval = tokio::time::interval(CLASSIFY_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = analyzer.classify_pending(batch) {
                warn!("Batch classification failed: {}", e);
            }
        }
    });
}
