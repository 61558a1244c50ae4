//! Health and admin endpoints for pipeline workers.
//!
//! - Liveness probes: `/health`, `/healthz`
//! - Readiness probes: `/ready`, `/readyz`
//! - Stream monitoring: `/stream/info`
//! - Prometheus metrics: `/metrics`
//! - Dead-letter admin: `/admin/dlq/*`

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use redis::aio::ConnectionManager;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::dlq::RedisDeadLetterSink;
use crate::metrics;

/// Shared state for health and admin endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub redis: Arc<ConnectionManager>,
    pub app_name: String,
    pub app_version: String,
    pub stream_name: String,
    pub dead_letter_key: String,
}

impl HealthState {
    pub fn new(
        redis: Arc<ConnectionManager>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        stream_name: impl Into<String>,
        dead_letter_key: impl Into<String>,
    ) -> Self {
        Self {
            redis,
            app_name: app_name.into(),
            app_version: app_version.into(),
            stream_name: stream_name.into(),
            dead_letter_key: dead_letter_key.into(),
        }
    }

    fn dead_letter_sink(&self) -> RedisDeadLetterSink {
        RedisDeadLetterSink::new(self.redis.clone(), &self.dead_letter_key)
    }
}

/// Liveness probe. Always OK while the server responds.
async fn health_handler(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "name": state.app_name,
        "version": state.app_version,
    }))
}

/// Readiness probe: verifies the broker connection.
async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut conn = (*state.redis).clone();

    let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;

    match result {
        Ok(response) if response == "PONG" => Ok(Json(json!({
            "status": "ready",
            "checks": { "redis": "ok" }
        }))),
        Ok(response) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "redis": format!("unexpected response: {response}") }
            })),
        )),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "redis": format!("error: {e}") }
            })),
        )),
    }
}

/// Stream depth and consumer-group info.
async fn stream_info_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut conn = (*state.redis).clone();

    let length: Result<i64, _> = redis::cmd("XLEN")
        .arg(&state.stream_name)
        .query_async(&mut conn)
        .await;

    match length {
        Ok(length) => Ok(Json(json!({
            "stream": state.stream_name,
            "length": length,
        }))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": format!("{e}") })),
        )),
    }
}

/// Prometheus metrics in exposition format.
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_list_count")]
    count: usize,
}

fn default_list_count() -> usize {
    50
}

/// List quarantined events for operator inspection.
async fn dlq_list_handler(
    State(state): State<HealthState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let sink = state.dead_letter_sink();

    match sink.list(params.count).await {
        Ok(records) => Ok(Json(json!({ "records": records }))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{e}") })),
        )),
    }
}

/// Dead-letter store statistics.
async fn dlq_stats_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let sink = state.dead_letter_sink();

    match sink.stats().await {
        Ok(stats) => Ok(Json(json!(stats))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{e}") })),
        )),
    }
}

/// Fetch one quarantined event by request id.
async fn dlq_get_handler(
    State(state): State<HealthState>,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let sink = state.dead_letter_sink();

    match sink.get(&request_id).await {
        Ok(Some(record)) => Ok(Json(json!(record))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not found" })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{e}") })),
        )),
    }
}

/// Delete one quarantined event after operator follow-up.
async fn dlq_delete_handler(
    State(state): State<HealthState>,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let sink = state.dead_letter_sink();

    match sink.delete(&request_id).await {
        Ok(deleted) => Ok(Json(json!({ "deleted": deleted }))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{e}") })),
        )),
    }
}

/// Drop all quarantined events.
async fn dlq_purge_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let sink = state.dead_letter_sink();

    match sink.purge().await {
        Ok(count) => Ok(Json(json!({ "purged": count }))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{e}") })),
        )),
    }
}

/// Health endpoints only.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/stream/info", get(stream_info_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health endpoints plus dead-letter admin.
pub fn full_admin_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/stream/info", get(stream_info_handler))
        .route("/metrics", get(metrics_handler))
        .route("/admin/dlq", get(dlq_list_handler))
        .route("/admin/dlq/stats", get(dlq_stats_handler))
        .route("/admin/dlq/purge", post(dlq_purge_handler))
        .route(
            "/admin/dlq/{request_id}",
            get(dlq_get_handler).delete(dlq_delete_handler),
        )
        .with_state(state)
}
