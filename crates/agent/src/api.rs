//! HTTP control plane
//!
//! Thin consumer of the registry and receiver: flush metrics, trigger runs,
//! inspect inventory, accept external metric submissions, and expose the
//! agent's own stats.

use agent_lib::collector::RegistryError;
use agent_lib::metrics::MetricSet;
use agent_lib::{Receiver, Registry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub registry: Registry,
    pub receiver: Receiver,
    pub stats_registry: prometheus::Registry,
    pub shutdown: CancellationToken,
    /// Pre-validated `|ST[...]` suffix appended to untagged metric names on
    /// flush; empty when no check tags are configured.
    pub check_tag_suffix: String,
}

impl AppState {
    fn decorate(&self, metrics: MetricSet) -> MetricSet {
        if self.check_tag_suffix.is_empty() {
            return metrics;
        }
        metrics
            .into_iter()
            .map(|(name, metric)| {
                if name.contains(agent_lib::tags::TAG_BLOCK_OPEN) {
                    (name, metric)
                } else {
                    (format!("{}{}", name, self.check_tag_suffix), metric)
                }
            })
            .collect()
    }
}

/// Full flush: every collector's snapshot plus the receiver buffer
async fn flush_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut metrics = state.registry.flush("");
    metrics.extend(state.receiver.flush());
    Json(state.decorate(metrics))
}

/// One collector's snapshot
async fn flush_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if !state.registry.is_builtin(&id) {
        return (StatusCode::NOT_FOUND, Json(MetricSet::new()));
    }
    (StatusCode::OK, Json(state.decorate(state.registry.flush(&id))))
}

/// Trigger a registry-wide collection run, then return the merged flush
async fn run_all(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Run-all never fails; overlapping requests are ignored by the registry.
    let _ = state.registry.run("", &state.shutdown).await;
    flush_all(State(state)).await
}

/// Trigger one collector's run, then return its flush
async fn run_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.run(&id, &state.shutdown).await {
        Ok(()) => (StatusCode::OK, Json(state.decorate(state.registry.flush(&id)))),
        Err(RegistryError::UnknownCollector(_)) => {
            (StatusCode::NOT_FOUND, Json(MetricSet::new()))
        }
    }
}

/// Collector introspection records
async fn inventory(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.inventory())
}

/// Store externally submitted metrics under a group id
async fn write_group(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    match state.receiver.store(&group, payload) {
        Ok(stored) => {
            info!(group = %group, stored = stored, "stored external metrics");
            StatusCode::NO_CONTENT
        }
        Err(err) => {
            info!(group = %group, error = %err, "rejected external metrics");
            StatusCode::BAD_REQUEST
        }
    }
}

/// Liveness probe
async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Agent self-stats in Prometheus exposition format
async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.stats_registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the control-plane router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(flush_all))
        .route("/flush/:id", get(flush_one))
        .route("/run", post(run_all))
        .route("/run/:id", post(run_one))
        .route("/inventory", get(inventory))
        .route("/write/:group", put(write_group))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Start the control-plane server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "starting control plane");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
