//! Redis Streams consumer-group operations.
//!
//! Reading, acknowledging, and claiming entries. Payloads that fail to
//! decode are separated out as poison messages instead of being dropped;
//! the worker dead-letters them so nothing stays pending forever.

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::event::{Delivery, PipelineEvent};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type StreamEntries = Vec<(String, Vec<(String, String)>)>;
type StreamReadReply = Vec<(String, StreamEntries)>;

/// Entries decoded from one read.
pub struct ReadOutcome<E: PipelineEvent> {
    /// Successfully decoded events.
    pub deliveries: Vec<Delivery<E>>,
    /// Entries whose payload could not be decoded.
    pub poison: Vec<PoisonMessage>,
}

impl<E: PipelineEvent> ReadOutcome<E> {
    fn empty() -> Self {
        Self {
            deliveries: Vec::new(),
            poison: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.poison.is_empty()
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.deliveries.extend(other.deliveries);
        self.poison.extend(other.poison);
        self
    }
}

/// A stream entry whose payload failed to decode.
#[derive(Debug, Clone)]
pub struct PoisonMessage {
    pub stream_id: String,
    pub payload: String,
    pub error: String,
}

/// Consumer-group reader for one stream.
#[derive(Clone)]
pub struct StreamConsumer {
    redis: Arc<ConnectionManager>,
    config: WorkerConfig,
}

impl StreamConsumer {
    pub fn new(redis: Arc<ConnectionManager>, config: WorkerConfig) -> Self {
        Self { redis, config }
    }

    pub fn redis(&self) -> Arc<ConnectionManager> {
        self.redis.clone()
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn consumer_group(&self) -> &str {
        &self.config.consumer_group
    }

    pub fn consumer_id(&self) -> &str {
        &self.config.consumer_id
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn ensure_consumer_group(&self) -> Result<(), WorkerError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(WorkerError::Redis(e)),
        }
    }

    /// Read entries delivered to this consumer but not yet acknowledged.
    pub async fn read_pending<E: PipelineEvent>(&self) -> Result<ReadOutcome<E>, WorkerError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg("0")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(streams) => Ok(parse_streams(streams)),
            Err(e) if e.to_string().contains("NOGROUP") => Ok(ReadOutcome::empty()),
            Err(e) => Err(WorkerError::Redis(e)),
        }
    }

    /// Blocking read of new entries.
    pub async fn read_new<E: PipelineEvent>(&self) -> Result<ReadOutcome<E>, WorkerError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<Option<StreamReadReply>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(streams)) => Ok(parse_streams(streams)),
            Ok(None) => Ok(ReadOutcome::empty()),
            Err(e) if e.to_string().contains("NOGROUP") => Ok(ReadOutcome::empty()),
            Err(e) => Err(WorkerError::Redis(e)),
        }
    }

    /// Acknowledge a terminally-handled entry.
    pub async fn ack(&self, stream_id: &str) -> Result<(), WorkerError> {
        let mut conn = (*self.redis).clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await?;

        debug!(stream_id = %stream_id, "Acknowledged entry");
        Ok(())
    }

    /// Claim entries abandoned by crashed consumers.
    pub async fn claim_abandoned<E: PipelineEvent>(&self) -> Result<ReadOutcome<E>, WorkerError> {
        let mut conn = (*self.redis).clone();

        // XPENDING summary entries: (id, consumer, idle_ms, delivery_count)
        let pending: RedisResult<Vec<(String, String, i64, i64)>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await;

        let pending = match pending {
            Ok(p) => p,
            Err(e) if e.to_string().contains("NOGROUP") => return Ok(ReadOutcome::empty()),
            Err(e) => return Err(WorkerError::Redis(e)),
        };

        let delivery_counts: HashMap<String, u32> = pending
            .iter()
            .map(|(id, _, _, count)| (id.clone(), *count as u32))
            .collect();

        let claim_ids: Vec<String> = pending
            .iter()
            .filter(|(_, _, idle_ms, _)| *idle_ms > self.config.claim_idle_ms as i64)
            .map(|(id, _, _, _)| id.clone())
            .collect();

        if claim_ids.is_empty() {
            return Ok(ReadOutcome::empty());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_idle_ms);
        for id in &claim_ids {
            cmd.arg(id);
        }

        let entries: StreamEntries = cmd.query_async(&mut conn).await?;
        let outcome = parse_entries(entries, &delivery_counts);

        if !outcome.is_empty() {
            warn!(
                claimed = outcome.deliveries.len() + outcome.poison.len(),
                "Claimed abandoned entries"
            );
        }

        Ok(outcome)
    }

    /// Stream length and pending count, for readiness/monitoring.
    pub async fn stream_info(&self) -> Result<StreamInfo, WorkerError> {
        let mut conn = (*self.redis).clone();

        let length: i64 = conn.xlen(&self.config.stream_name).await.unwrap_or(0);

        let pending: RedisResult<(i64, Option<String>, Option<String>, Option<Vec<(String, i64)>>)> =
            redis::cmd("XPENDING")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .query_async(&mut conn)
                .await;

        let pending_count = pending.map(|(count, _, _, _)| count).unwrap_or(0);

        Ok(StreamInfo {
            stream_name: self.config.stream_name.clone(),
            length,
            pending_count,
            consumer_group: self.config.consumer_group.clone(),
        })
    }

}

fn parse_streams<E: PipelineEvent>(streams: StreamReadReply) -> ReadOutcome<E> {
    let mut outcome = ReadOutcome::empty();
    for (_stream_name, entries) in streams {
        outcome = outcome.merge(parse_entries(entries, &HashMap::new()));
    }
    outcome
}

fn parse_entries<E: PipelineEvent>(
    entries: StreamEntries,
    delivery_counts: &HashMap<String, u32>,
) -> ReadOutcome<E> {
    let mut outcome = ReadOutcome::empty();

    for (stream_id, fields) in entries {
        let payload = fields
            .iter()
            .find(|(key, _)| key == "event")
            .map(|(_, value)| value.as_str());

        let Some(json) = payload else {
            warn!(
                stream_id = %stream_id,
                fields = ?fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                "Entry is missing the 'event' field"
            );
            outcome.poison.push(PoisonMessage {
                stream_id,
                payload: String::new(),
                error: "missing 'event' field".to_string(),
            });
            continue;
        };

        let delivery_count = delivery_counts.get(&stream_id).copied().unwrap_or(1);

        match serde_json::from_str::<E>(json) {
            Ok(event) => {
                outcome.deliveries.push(Delivery::with_delivery_count(
                    stream_id,
                    event,
                    delivery_count,
                ));
            }
            Err(e) => {
                warn!(
                    stream_id = %stream_id,
                    error = %e,
                    "Failed to decode event payload"
                );
                outcome.poison.push(PoisonMessage {
                    stream_id,
                    payload: json.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    outcome
}

/// Stream state snapshot.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub stream_name: String,
    pub length: i64,
    pub pending_count: i64,
    pub consumer_group: String,
}
