//! Event Pipeline Framework
//!
//! A generic Redis Streams pipeline for processing asynchronous work events.
//! Every event delivered by the broker is driven to exactly one terminal
//! state: processed successfully, or quarantined in the dead-letter store.
//!
//! ## Features
//!
//! - **Generic worker**: `PipelineWorker<E, P>` processes any event type
//! - **Consumer groups**: Horizontal scaling with Redis consumer groups
//! - **Bounded retries**: Iterative retry loop with capped exponential backoff
//! - **Dead-letter quarantine**: Idempotent per-request-id records for
//!   events that exhausted retries or can never validate
//! - **Prometheus metrics**: Injected recorder, fakeable in tests
//! - **Health endpoints**: Liveness/readiness probes plus dead-letter admin
//!
//! ## Example
//!
//! ```ignore
//! use event_worker::{PipelineWorker, RetryCoordinator, WorkerConfig, RedisDeadLetterSink};
//!
//! let config = WorkerConfig::from_stream_def::<MyStream>()
//!     .with_retry_policy(RetryPolicy::from_env()?);
//! let sink = Arc::new(RedisDeadLetterSink::from_stream_def::<MyStream>(redis.clone()));
//! let coordinator = RetryCoordinator::new(processor, sink, recorder, config.retry.clone(), "my-service");
//! let worker = PipelineWorker::new(redis, coordinator, config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod connection;
mod consumer;
mod coordinator;
mod dlq;
mod error;
mod event;
mod health;
pub mod metrics;
mod producer;
mod registry;
mod worker;

// Re-export main types
pub use config::{RetryPolicy, WorkerConfig};
pub use connection::{connect, connect_from_config, connect_with_retry};
pub use consumer::{PoisonMessage, ReadOutcome, StreamConsumer, StreamInfo};
pub use coordinator::{RetryCoordinator, Terminal};
pub use dlq::{
    DeadLetterRecord, DeadLetterSink, DeadLetterStats, RedisDeadLetterSink,
    REASON_RETRIES_EXHAUSTED,
};
pub use error::{ProcessingError, SinkError, WorkerError};
pub use event::{Delivery, PipelineEvent};
pub use health::{full_admin_router, health_router, HealthState};
pub use metrics::{init_metrics, AttemptTimer, MetricsRecorder, PrometheusRecorder};
pub use producer::EventProducer;
pub use registry::StreamDef;
pub use worker::{EventProcessor, PipelineWorker};
