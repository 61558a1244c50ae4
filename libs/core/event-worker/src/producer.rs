//! Event producer.
//!
//! Used by any service (gateway, CLI, another worker) to enqueue events for
//! background processing.
//!
//! # Example
//!
//! ```rust,ignore
//! use event_worker::{EventProducer, StreamDef};
//!
//! let producer = EventProducer::from_stream_def::<ChatStream>(redis);
//! let stream_id = producer.send(&event).await?;
//! ```

use crate::error::WorkerError;
use crate::registry::StreamDef;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Appends serialized events to a stream.
pub struct EventProducer {
    redis: Arc<ConnectionManager>,
    stream_name: String,
    max_length: i64,
}

impl EventProducer {
    pub fn new(redis: Arc<ConnectionManager>, stream_name: impl Into<String>) -> Self {
        Self {
            redis,
            stream_name: stream_name.into(),
            max_length: 100_000,
        }
    }

    /// Create a producer from a `StreamDef`, keeping stream name and
    /// trim length consistent with the worker.
    pub fn from_stream_def<S: StreamDef>(redis: Arc<ConnectionManager>) -> Self {
        Self {
            redis,
            stream_name: S::STREAM_NAME.to_string(),
            max_length: S::MAX_LENGTH,
        }
    }

    /// Set the maximum stream length (MAXLEN ~).
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Enqueue an event. Returns the Redis stream entry ID.
    pub async fn send<E: Serialize>(&self, event: &E) -> Result<String, WorkerError> {
        let mut conn = (*self.redis).clone();

        let payload = serde_json::to_string(event)?;

        // MAXLEN ~ trims approximately, which is cheaper than exact trims.
        let stream_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg("event") // Field name matches what StreamConsumer expects
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %self.stream_name,
            stream_id = %stream_id,
            "Enqueued event"
        );

        Ok(stream_id)
    }

    /// Current stream length.
    pub async fn stream_length(&self) -> Result<i64, WorkerError> {
        let mut conn = (*self.redis).clone();
        let len: i64 = conn.xlen(&self.stream_name).await?;
        Ok(len)
    }
}

impl Clone for EventProducer {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            stream_name: self.stream_name.clone(),
            max_length: self.max_length,
        }
    }
}
