//! HTTP route handlers for the tracelens server.

pub mod checkpoints;
pub mod diff;
pub mod failures;
pub mod graph;
pub mod replays;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}
