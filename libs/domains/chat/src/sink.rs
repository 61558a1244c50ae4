//! Result persistence.

use crate::error::{ChatError, ChatResult};
use crate::models::{GenerationResult, StoredResult};
use crate::streams::ChatResultStream;
use async_trait::async_trait;
use event_worker::EventProducer;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::debug;

/// Durably persists a completed result.
///
/// Persistence must complete before the event counts as processed; a
/// failure here is transient and reruns the whole attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, request_id: &str, result: &GenerationResult) -> ChatResult<()>;
}

/// Persists results to the `chat:results` stream.
pub struct StreamResultSink {
    producer: EventProducer,
}

impl StreamResultSink {
    pub fn new(redis: Arc<ConnectionManager>) -> Self {
        Self {
            producer: EventProducer::from_stream_def::<ChatResultStream>(redis),
        }
    }

    pub fn with_producer(producer: EventProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl ResultSink for StreamResultSink {
    async fn persist(&self, request_id: &str, result: &GenerationResult) -> ChatResult<()> {
        let stored = StoredResult::new(request_id, result);

        let stream_id = self
            .producer
            .send(&stored)
            .await
            .map_err(|e| ChatError::Persistence(e.to_string()))?;

        debug!(
            request_id = %request_id,
            stream_id = %stream_id,
            provider = %result.provider,
            "Persisted result"
        );

        Ok(())
    }
}
