//! Integration tests for the control-plane endpoints
//!
//! The router under test mirrors the one the binary builds: a registry with
//! stub collectors, a receiver, and an injected stats registry.

use agent_lib::collector::{
    async_trait, Collector, CollectorError, InventoryRecord, Registry, RunCore,
};
use agent_lib::metrics::{Metric, MetricSet};
use agent_lib::{AgentStats, Receiver};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestState {
    registry: Registry,
    receiver: Receiver,
    shutdown: CancellationToken,
}

/// Stub source: one metric per run, or a permanent failure.
struct StubCollector {
    core: RunCore,
    fail: bool,
}

impl StubCollector {
    fn new(id: &str) -> Self {
        Self {
            core: RunCore::new(id, Duration::ZERO),
            fail: false,
        }
    }

    fn failing(id: &str) -> Self {
        Self {
            core: RunCore::new(id, Duration::ZERO),
            fail: true,
        }
    }
}

#[async_trait]
impl Collector for StubCollector {
    async fn collect(&self, _token: &CancellationToken) -> Result<(), CollectorError> {
        self.core.begin_run()?;
        let outcome = if self.fail {
            Err(CollectorError::Source(anyhow::anyhow!("stub failure")))
        } else {
            let mut metrics = MetricSet::new();
            metrics.insert(format!("{}`value", self.core.id()), Metric::uint64(7));
            Ok(metrics)
        };
        self.core.end_run(outcome)
    }

    fn flush(&self) -> MetricSet {
        self.core.flush()
    }

    fn id(&self) -> &str {
        self.core.id()
    }

    fn inventory(&self) -> InventoryRecord {
        self.core.inventory()
    }
}

async fn flush_all(State(state): State<Arc<TestState>>) -> impl IntoResponse {
    let mut metrics = state.registry.flush("");
    metrics.extend(state.receiver.flush());
    Json(metrics)
}

async fn run_all(State(state): State<Arc<TestState>>) -> impl IntoResponse {
    let _ = state.registry.run("", &state.shutdown).await;
    flush_all(State(state)).await
}

async fn inventory(State(state): State<Arc<TestState>>) -> impl IntoResponse {
    Json(state.registry.inventory())
}

async fn write_group(
    State(state): State<Arc<TestState>>,
    Path(group): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    match state.receiver.store(&group, payload) {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

fn create_test_router(state: Arc<TestState>) -> Router {
    Router::new()
        .route("/", get(flush_all))
        .route("/run", post(run_all))
        .route("/inventory", get(inventory))
        .route("/write/:group", put(write_group))
        .with_state(state)
}

fn setup_test_app() -> (Router, Arc<TestState>) {
    let prom = prometheus::Registry::new();
    let stats = AgentStats::new(&prom).unwrap();

    let mut registry = Registry::new(stats);
    registry.register(Arc::new(StubCollector::new("alpha")));
    registry.register(Arc::new(StubCollector::failing("beta")));

    let state = Arc::new(TestState {
        registry,
        receiver: Receiver::new(),
        shutdown: CancellationToken::new(),
    });
    let router = create_test_router(state.clone());

    (router, state)
}

#[tokio::test]
async fn test_flush_is_empty_before_first_run() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(metrics, serde_json::json!({}));
}

#[tokio::test]
async fn test_run_returns_surviving_collectors_metrics() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/run")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics: serde_json::Value = serde_json::from_slice(&body).unwrap();

    // The failing collector contributes nothing but does not fail the run.
    assert_eq!(metrics["alpha`value"]["_type"], "L");
    assert_eq!(metrics["alpha`value"]["_value"], 7);
    assert!(metrics.get("beta`value").is_none());
}

#[tokio::test]
async fn test_inventory_reports_both_collectors() {
    let (app, state) = setup_test_app();
    state.registry.run("", &state.shutdown).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/inventory")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let records: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(records[0]["id"], "alpha");
    assert_eq!(records[0]["last_error"], "");
    assert_eq!(records[1]["id"], "beta");
    assert_eq!(records[1]["last_error"], "stub failure");
}

#[tokio::test]
async fn test_write_accepts_wire_shaped_payload() {
    let (app, state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/write/queue")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({"depth": {"_type": "L", "_value": 3}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(state.receiver.flush().contains_key("queue`depth"));
}

#[tokio::test]
async fn test_write_rejects_malformed_payload() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/write/queue")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({"depth": {"_value": "typeless"}}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
