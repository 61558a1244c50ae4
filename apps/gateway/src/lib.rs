//! Chat Gateway
//!
//! Thin inbound endpoint: `POST /chat` assigns a request id, enqueues a
//! `ChatEvent` on the chat stream, and acknowledges immediately. The
//! pipeline does the actual work asynchronously; no caller ever waits on
//! retrieval or generation.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use core_config::redis::RedisConfig;
use core_config::{env_parse_or, Environment, FromEnv};
use domain_chat::{ChatEvent, ChatStream, RoutingContext};
use event_worker::{connect_with_retry, EventProducer};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Inbound chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub tenant_id: String,
    pub message: String,
    /// Optional routing hints (e.g. `{"low_cost": "true"}`).
    #[serde(default)]
    pub routing: RoutingContext,
}

/// Async acknowledgement returned to the caller.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub request_id: String,
    pub status: &'static str,
}

#[derive(Clone)]
struct AppState {
    producer: EventProducer,
}

/// Reject requests the pipeline would quarantine anyway.
fn validate(request: &ChatRequest) -> Result<(), &'static str> {
    if request.tenant_id.trim().is_empty() {
        return Err("tenant_id must not be empty");
    }
    if request.message.trim().is_empty() {
        return Err("message must not be empty");
    }
    Ok(())
}

/// `POST /chat`: validate, assign a request id, enqueue, acknowledge.
async fn accept_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), (StatusCode, Json<Value>)> {
    if let Err(reason) = validate(&request) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": reason })),
        ));
    }

    let event = ChatEvent::new(request.tenant_id, request.message, request.routing);
    let request_id = event.request_id.clone();

    match state.producer.send(&event).await {
        Ok(stream_id) => {
            info!(
                request_id = %request_id,
                tenant_id = %event.tenant_id,
                stream_id = %stream_id,
                "Accepted chat request"
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(ChatResponse {
                    request_id,
                    status: "accepted",
                }),
            ))
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Failed to enqueue chat request");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "event broker unavailable" })),
            ))
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(accept_chat))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the gateway.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting chat gateway"
    );

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let redis = Arc::new(
        connect_with_retry(&redis_config.url, 5)
            .await
            .wrap_err("Failed to connect to Redis")?,
    );

    let producer = EventProducer::from_stream_def::<ChatStream>(redis);
    let state = AppState { producer };

    let port: u16 = env_parse_or("GATEWAY_PORT", 8080)?;
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind gateway to {addr}"))?;

    info!(port = %port, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down gateway");
        })
        .await
        .wrap_err("Gateway server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tenant_id: &str, message: &str) -> ChatRequest {
        ChatRequest {
            tenant_id: tenant_id.to_string(),
            message: message.to_string(),
            routing: RoutingContext::default(),
        }
    }

    #[test]
    fn validate_rejects_empty_fields() {
        assert!(validate(&request("", "hello")).is_err());
        assert!(validate(&request("t1", "   ")).is_err());
        assert!(validate(&request("t1", "hello")).is_ok());
    }

    #[test]
    fn request_body_accepts_routing_hints() {
        let body = r#"{"tenant_id":"t1","message":"hi","routing":{"low_cost":"true"}}"#;
        let request: ChatRequest = serde_json::from_str(body).unwrap();
        assert!(request.routing.flag(domain_chat::HINT_LOW_COST));

        let body = r#"{"tenant_id":"t1","message":"hi"}"#;
        let request: ChatRequest = serde_json::from_str(body).unwrap();
        assert!(request.routing.is_empty());
    }
}
