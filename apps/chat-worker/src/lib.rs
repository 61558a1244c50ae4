//! Chat Worker Service
//!
//! A background worker that processes tenant chat events from a Redis
//! stream.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (chat:events)
//!   ↓ (Consumer Group: chat_workers)
//! PipelineWorker<ChatEvent, ChatProcessor>
//!   ↓ validate → retrieve context → route + generate → persist
//! Redis Stream (chat:results)
//!   ↘ (exhausted retries / invalid events)
//! Dead-letter hash (chat:dlq)
//! ```
//!
//! ## Features
//!
//! - Consumer group support for horizontal scaling
//! - Bounded retries with capped exponential backoff
//! - Idempotent dead-letter quarantine for terminally-failed events
//! - Graceful shutdown that lets in-flight events finish
//! - Health, metrics, and dead-letter admin endpoints

use axum::Router;
use core_config::redis::RedisConfig;
use core_config::{env_parse_or, Environment, FromEnv};
use domain_chat::{
    ChatProcessor, ChatStream, HttpContextRetriever, HttpGenerationClient, ProviderRouter,
    StreamResultSink, SERVICE_NAME,
};
use event_worker::{
    connect_with_retry, full_admin_router, metrics, HealthState, PipelineWorker,
    PrometheusRecorder, RedisDeadLetterSink, RetryCoordinator, RetryPolicy, StreamDef,
    WorkerConfig,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Start the health and admin HTTP server.
///
/// Provides liveness/readiness probes, `/metrics`, and the dead-letter
/// admin endpoints under `/admin/dlq`.
async fn start_health_server(health_state: HealthState, port: u16) -> Result<()> {
    let app: Router = full_admin_router(health_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {addr}"))?;

    info!(port = %port, "Health and admin server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the chat worker.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the broker is
/// unreachable, a generation backend is unconfigured, or the worker hits a
/// fatal error.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting chat worker service"
    );

    let health_port: u16 = env_parse_or("HEALTH_PORT", 8082)?;

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;

    info!("Connecting to Redis...");
    let redis = Arc::new(
        connect_with_retry(&redis_config.url, 5)
            .await
            .wrap_err("Failed to connect to Redis")?,
    );

    let retry_policy = RetryPolicy::from_env().wrap_err("Failed to load retry policy")?;
    let max_concurrent_events: usize = env_parse_or("MAX_CONCURRENT_EVENTS", 8)?;

    let worker_config = WorkerConfig::from_stream_def::<ChatStream>()
        .with_block_timeout_ms(1000) // Instant delivery + clean shutdown
        .with_batch_size(20)
        .with_max_concurrent_events(max_concurrent_events)
        .with_retry_policy(retry_policy);
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        max_retries = worker_config.retry.max_retries,
        base_backoff_secs = worker_config.retry.base_backoff_secs,
        max_backoff_secs = worker_config.retry.max_backoff_secs,
        max_concurrent_events = %worker_config.max_concurrent_events,
        "Worker configuration loaded"
    );

    // Collaborators behind their narrow interfaces.
    let retriever =
        Arc::new(HttpContextRetriever::from_env().wrap_err("Failed to configure retrieval")?);
    let generator =
        Arc::new(HttpGenerationClient::from_env().wrap_err("Failed to configure generation")?);
    let results = Arc::new(StreamResultSink::new(redis.clone()));
    let dead_letters = Arc::new(RedisDeadLetterSink::from_stream_def::<ChatStream>(
        redis.clone(),
    ));
    let recorder = Arc::new(PrometheusRecorder::new());

    let processor = ChatProcessor::new(
        ProviderRouter::default(),
        retriever,
        generator,
        results,
        recorder.clone(),
    );
    info!("Chat processor initialized");

    let coordinator = RetryCoordinator::new(
        Arc::new(processor),
        dead_letters,
        recorder,
        worker_config.retry.clone(),
        SERVICE_NAME,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        redis.clone(),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        ChatStream::stream_name(),
        ChatStream::dead_letter_key(),
    );

    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("Starting chat event processor...");
    let worker = PipelineWorker::new(redis, coordinator, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .wrap_err("Worker encountered a fatal error")?;

    info!("Chat worker service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
