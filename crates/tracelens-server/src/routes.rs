use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::ServerState;

pub fn router(state: Arc<ServerState>) -> Router {
    let trace_routes = Router::new()
        .route("/api/traces/{id}/graph", get(handlers::graph::get))
        .route("/api/traces/{id}/graph/paths", get(handlers::graph::paths))
        .route("/api/traces/{id}/metrics", get(handlers::graph::metrics))
        .route(
            "/api/traces/{id}/failures",
            get(handlers::failures::list).post(handlers::failures::annotate),
        )
        .route("/api/traces/{id}/failures/classify", post(handlers::failures::classify))
        .route("/api/traces/{id}/checkpoints", get(handlers::checkpoints::list))
        .route("/api/traces/{id}/checkpoints/auto", post(handlers::checkpoints::auto))
        .route("/api/traces/{id}/replays", get(handlers::replays::list_for_trace));

    let checkpoint_routes = Router::new()
        .route(
            "/api/checkpoints/{id}",
            get(handlers::checkpoints::get).delete(handlers::checkpoints::delete),
        )
        .route("/api/checkpoints/{id}/replay", post(handlers::replays::replay))
        .route("/api/replays/{id}", get(handlers::replays::get));

    Router::new()
        .merge(trace_routes)
        .merge(checkpoint_routes)
        .route("/api/taxonomy", get(handlers::failures::taxonomy))
        .route("/api/diff", post(handlers::diff::compare))
        .route("/health", get(handlers::health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tracelens_config::Settings;
    use tracelens_core::{
        Agent, AgentMessage, MessageType, Span, SpanKind, SpanStatus, TraceRecord, TraceStatus,
    };
    use tracelens_replay::ExecutorRegistry;
    use tracelens_store::TraceStore;

    fn app() -> Router {
        let store = Arc::new(TraceStore::in_memory().unwrap());
        store.insert_trace(&TraceRecord::new("t1", 0, TraceStatus::Failed)).unwrap();
        store.insert_agent(&Agent::new("a1", "t1", "planner")).unwrap();
        store.insert_agent(&Agent::new("a2", "t1", "coder")).unwrap();
        store
            .insert_span(
                &Span::new("s1", "t1", "delegate", SpanKind::Handoff, 10)
                    .with_agent("a1")
                    .with_end(20),
            )
            .unwrap();
        store
            .insert_span(
                &Span::new("s2", "t1", "write", SpanKind::LlmCall, 30)
                    .with_agent("a2")
                    .with_end(90)
                    .with_status(SpanStatus::Error)
                    .with_input(json!({"prompt": "patch"}))
                    .with_output(json!({"patch": "+1"}))
                    .with_error(json!({"message": "invalid JSON in response"})),
            )
            .unwrap();
        store
            .insert_message(&AgentMessage::new("m1", "t1", "a1", "a2", MessageType::Handoff, 25))
            .unwrap();

        let settings = Settings::default();
        let state = ServerState::new(&settings, store, Arc::new(ExecutorRegistry::with_builtins()));
        router(Arc::new(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_graph_and_paths() {
        let app = app();

        let (status, graph) = send(&app, Method::GET, "/api/traces/t1/graph", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(graph["metrics"]["node_count"], json!(2));
        assert_eq!(graph["metrics"]["edge_count"], json!(1));

        let (status, paths) =
            send(&app, Method::GET, "/api/traces/t1/graph/paths?from=planner&to=coder", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(paths["shortest"], json!(["planner", "coder"]));

        let (status, body) = send(&app, Method::GET, "/api/traces/missing/graph", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_classify_then_list_failures() {
        let app = app();

        let (status, classified) =
            send(&app, Method::POST, "/api/traces/t1/failures/classify", None).await;
        assert_eq!(status, StatusCode::OK);
        let modes: Vec<&str> = classified["annotations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["failure_mode"].as_str().unwrap())
            .collect();
        assert!(modes.contains(&"format_error"));

        let (status, listed) = send(&app, Method::GET, "/api/traces/t1/failures", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["annotations"], classified["annotations"]);
    }

    #[tokio::test]
    async fn test_manual_annotation() {
        let app = app();

        let (status, annotation) = send(
            &app,
            Method::POST,
            "/api/traces/t1/failures",
            Some(json!({"failure_mode": "hallucination", "reasoning": "made up an API", "span_id": "s2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(annotation["source"], json!("manual"));
        assert_eq!(annotation["confidence"], json!(1.0));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/traces/t1/failures",
            Some(json!({"failure_mode": "hallucination", "confidence": 1.5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_taxonomy_lists_every_mode() {
        let (status, body) = send(&app(), Method::GET, "/api/taxonomy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["failure_modes"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_checkpoint_replay_and_delete() {
        let app = app();

        let (status, report) = send(&app, Method::POST, "/api/traces/t1/checkpoints/auto", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["created"], json!(2));
        let checkpoint_id = report["checkpoint_ids"][1].as_str().unwrap().to_string();

        let (status, listed) = send(&app, Method::GET, "/api/traces/t1/checkpoints", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["checkpoints"].as_array().unwrap().len(), 2);

        let uri = format!("/api/checkpoints/{checkpoint_id}/replay");
        let (status, result) = send(&app, Method::POST, &uri, Some(json!({"dry_run": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["framework"], json!("mock"));

        let replay_uri = format!("/api/replays/{}", result["replay_id"].as_str().unwrap());
        let (status, stored) = send(&app, Method::GET, &replay_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored["replay_id"], result["replay_id"]);

        let (_, history) = send(&app, Method::GET, "/api/traces/t1/replays", None).await;
        assert_eq!(history["replays"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::POST, &uri, Some(json!({"timeout_seconds": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let checkpoint_uri = format!("/api/checkpoints/{checkpoint_id}");
        let (status, checkpoint) = send(&app, Method::GET, &checkpoint_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(checkpoint["state"]["schema_version"], json!(1));

        let (status, _) = send(&app, Method::DELETE, &checkpoint_uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, &checkpoint_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_replay_of_unknown_checkpoint() {
        let (status, _) = send(
            &app(),
            Method::POST,
            "/api/checkpoints/t1:nope:0000/replay",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_replay_history_of_trace_without_replays() {
        let (status, body) = send(&app(), Method::GET, "/api/traces/t1/replays", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["replays"], json!([]));
    }

    #[tokio::test]
    async fn test_diff_endpoint() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/diff",
            Some(json!({"original": {"a": 1, "b": 2}, "replay": {"a": 1, "c": 3}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_changes"], json!(true));
        assert_eq!(body["added"], json!(["c"]));
        assert_eq!(body["removed"], json!(["b"]));
        assert!(body["display"].as_str().unwrap().contains("Summary"));
    }
}
