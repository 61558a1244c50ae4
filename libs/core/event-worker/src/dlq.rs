//! Dead-letter quarantine.
//!
//! Quarantine is the terminal resolution for an event that exhausted its
//! retries or can never validate. Records are keyed by request id so a
//! redelivered event produces exactly one logical record.

use crate::error::SinkError;
use crate::event::PipelineEvent;
use crate::registry::StreamDef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Failure reason recorded when an event runs out of retries.
pub const REASON_RETRIES_EXHAUSTED: &str = "retries_exhausted";

/// Immutable record of a terminally-failed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Correlation ID of the failed event
    pub request_id: String,

    /// Owning tenant
    pub tenant_id: String,

    /// Original event payload, verbatim
    pub event: serde_json::Value,

    /// Retry count at the moment of quarantine
    pub final_retry_count: u32,

    /// Why the event was quarantined
    pub failure_reason: String,

    /// When the record was created
    pub quarantined_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// Build a record from a failed event.
    pub fn from_event<E: PipelineEvent>(
        event: &E,
        failure_reason: impl Into<String>,
    ) -> Result<Self, SinkError> {
        Ok(Self {
            request_id: event.request_id(),
            tenant_id: event.tenant_id(),
            event: serde_json::to_value(event)?,
            final_retry_count: event.retry_count(),
            failure_reason: failure_reason.into(),
            quarantined_at: Utc::now(),
        })
    }

    /// Build a record for a payload that failed to decode.
    ///
    /// The stream entry ID stands in for the request id: it is unique, so
    /// dedupe still holds, and the raw payload is preserved for inspection.
    pub fn poison(stream_id: &str, payload: &str, error: &str) -> Self {
        Self {
            request_id: format!("poison-{stream_id}"),
            tenant_id: String::new(),
            event: serde_json::Value::String(payload.to_string()),
            final_retry_count: 0,
            failure_reason: format!("undecodable event: {error}"),
            quarantined_at: Utc::now(),
        }
    }
}

/// Durable store for dead-letter records.
///
/// A successful return must survive a crash; a write failure must prevent
/// the event's acknowledgement so the broker redelivers it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Durably record a terminally-failed event.
    ///
    /// Returns `true` when newly written, `false` when a record for the
    /// same request id already exists (idempotent quarantine).
    async fn quarantine(&self, record: &DeadLetterRecord) -> Result<bool, SinkError>;
}

/// Redis-backed dead-letter store.
///
/// Records live in a hash keyed by request id; `HSETNX` makes the write
/// idempotent under broker redelivery.
pub struct RedisDeadLetterSink {
    redis: Arc<ConnectionManager>,
    dead_letter_key: String,
}

impl RedisDeadLetterSink {
    pub fn new(redis: Arc<ConnectionManager>, dead_letter_key: impl Into<String>) -> Self {
        Self {
            redis,
            dead_letter_key: dead_letter_key.into(),
        }
    }

    pub fn from_stream_def<S: StreamDef>(redis: Arc<ConnectionManager>) -> Self {
        Self::new(redis, S::DEAD_LETTER_KEY)
    }

    pub fn dead_letter_key(&self) -> &str {
        &self.dead_letter_key
    }

    /// Fetch a record by request id.
    pub async fn get(&self, request_id: &str) -> Result<Option<DeadLetterRecord>, SinkError> {
        let mut conn = (*self.redis).clone();

        let raw: Option<String> = conn.hget(&self.dead_letter_key, request_id).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// List up to `count` records, for operator inspection.
    pub async fn list(&self, count: usize) -> Result<Vec<DeadLetterRecord>, SinkError> {
        let mut conn = (*self.redis).clone();

        let raw: Vec<String> = conn.hvals(&self.dead_letter_key).await?;
        let mut records = Vec::new();
        for json in raw.into_iter().take(count) {
            if let Ok(record) = serde_json::from_str::<DeadLetterRecord>(&json) {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Remove a record after operator follow-up.
    pub async fn delete(&self, request_id: &str) -> Result<bool, SinkError> {
        let mut conn = (*self.redis).clone();

        let deleted: i64 = conn.hdel(&self.dead_letter_key, request_id).await?;
        debug!(request_id = %request_id, "Deleted dead-letter record");

        Ok(deleted > 0)
    }

    /// Number of quarantined events.
    pub async fn len(&self) -> Result<i64, SinkError> {
        let mut conn = (*self.redis).clone();
        Ok(conn.hlen(&self.dead_letter_key).await?)
    }

    /// Drop every record.
    pub async fn purge(&self) -> Result<i64, SinkError> {
        let mut conn = (*self.redis).clone();

        let len: i64 = conn.hlen(&self.dead_letter_key).await?;
        if len > 0 {
            let _: () = conn.del(&self.dead_letter_key).await?;
            info!(count = len, "Purged dead-letter store");
        }

        Ok(len)
    }

    /// Store statistics for the admin endpoints.
    pub async fn stats(&self) -> Result<DeadLetterStats, SinkError> {
        Ok(DeadLetterStats {
            key: self.dead_letter_key.clone(),
            length: self.len().await?,
        })
    }
}

#[async_trait]
impl DeadLetterSink for RedisDeadLetterSink {
    async fn quarantine(&self, record: &DeadLetterRecord) -> Result<bool, SinkError> {
        let data = serde_json::to_string(record)?;
        let mut conn = (*self.redis).clone();

        let newly_written: bool = conn
            .hset_nx(&self.dead_letter_key, &record.request_id, &data)
            .await?;

        if newly_written {
            info!(
                request_id = %record.request_id,
                tenant_id = %record.tenant_id,
                final_retry_count = record.final_retry_count,
                failure_reason = %record.failure_reason,
                "Quarantined event"
            );
        } else {
            debug!(
                request_id = %record.request_id,
                "Dead-letter record already exists, keeping the original"
            );
        }

        Ok(newly_written)
    }
}

impl Clone for RedisDeadLetterSink {
    fn clone(&self) -> Self {
        Self {
            redis: self.redis.clone(),
            dead_letter_key: self.dead_letter_key.clone(),
        }
    }
}

/// Dead-letter store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterStats {
    pub key: String,
    pub length: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Serialize, Deserialize, Debug)]
    struct TestEvent {
        request_id: String,
        tenant_id: String,
        retry_count: u32,
    }

    impl PipelineEvent for TestEvent {
        fn request_id(&self) -> String {
            self.request_id.clone()
        }
        fn tenant_id(&self) -> String {
            self.tenant_id.clone()
        }
        fn retry_count(&self) -> u32 {
            self.retry_count
        }
        fn with_retry(&self) -> Self {
            Self {
                retry_count: self.retry_count + 1,
                ..self.clone()
            }
        }
    }

    #[test]
    fn record_from_event_captures_final_state() {
        let event = TestEvent {
            request_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            retry_count: 3,
        };

        let record = DeadLetterRecord::from_event(&event, REASON_RETRIES_EXHAUSTED).unwrap();

        assert_eq!(record.request_id, "r1");
        assert_eq!(record.tenant_id, "t1");
        assert_eq!(record.final_retry_count, 3);
        assert_eq!(record.failure_reason, "retries_exhausted");
        assert_eq!(record.event["request_id"], "r1");
    }

    #[test]
    fn record_round_trips_through_json() {
        let event = TestEvent {
            request_id: "r2".to_string(),
            tenant_id: "t2".to_string(),
            retry_count: 0,
        };
        let record = DeadLetterRecord::from_event(&event, "message is empty").unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: DeadLetterRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back.request_id, "r2");
        assert_eq!(back.failure_reason, "message is empty");
    }

    #[test]
    fn poison_record_is_keyed_by_stream_id() {
        let record = DeadLetterRecord::poison("1700000000000-0", "{not json", "expected value");

        assert_eq!(record.request_id, "poison-1700000000000-0");
        assert!(record.failure_reason.contains("undecodable"));
        assert_eq!(
            record.event,
            serde_json::Value::String("{not json".to_string())
        );
    }
}
