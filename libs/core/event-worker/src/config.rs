//! Worker and retry configuration.

use crate::registry::StreamDef;
use core_config::{env_parse_or, ConfigError, FromEnv};
use std::time::Duration;
use uuid::Uuid;

/// Retry policy for the coordinator.
///
/// Backoff grows exponentially (`base ^ retries_already_made`) and is capped
/// at `max_backoff_secs`. The exponent is always the number of retries made
/// *before* the wait, so the first wait is `base ^ 0` seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt (so `max_retries + 1` total
    /// processing attempts).
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds.
    pub base_backoff_secs: u64,

    /// Hard cap on any single backoff wait, in seconds.
    pub max_backoff_secs: u64,
}

impl RetryPolicy {
    /// Backoff before the next attempt, given the number of retries already
    /// made. Monotonically non-decreasing and capped.
    pub fn backoff_delay(&self, prior_retries: u32) -> Duration {
        let secs = self
            .base_backoff_secs
            .saturating_pow(prior_retries)
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_secs: 2,
            max_backoff_secs: 30,
        }
    }
}

impl FromEnv for RetryPolicy {
    /// Reads MAX_RETRIES (3), BASE_BACKOFF_SECONDS (2), MAX_BACKOFF_SECONDS (30).
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_retries: env_parse_or("MAX_RETRIES", 3)?,
            base_backoff_secs: env_parse_or("BASE_BACKOFF_SECONDS", 2)?,
            max_backoff_secs: env_parse_or("MAX_BACKOFF_SECONDS", 30)?,
        })
    }
}

/// Configuration for the pipeline worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redis stream name events are read from
    pub stream_name: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Unique consumer ID (auto-generated if not provided)
    pub consumer_id: String,

    /// Dead-letter hash key
    pub dead_letter_key: String,

    /// Maximum stream length before approximate trimming
    pub max_length: i64,

    /// Batch size for reading messages
    pub batch_size: usize,

    /// Blocking read timeout in milliseconds
    pub block_timeout_ms: u64,

    /// Maximum events processed concurrently by this worker
    pub max_concurrent_events: usize,

    /// Idle time in milliseconds before claiming a message abandoned by
    /// another consumer
    pub claim_idle_ms: u64,

    /// Retry policy applied per event
    pub retry: RetryPolicy,
}

impl WorkerConfig {
    /// Create a WorkerConfig from a StreamDef.
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self {
            stream_name: S::STREAM_NAME.to_string(),
            consumer_group: S::CONSUMER_GROUP.to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            dead_letter_key: S::DEAD_LETTER_KEY.to_string(),
            max_length: S::MAX_LENGTH,
            batch_size: 10,
            block_timeout_ms: 5000,
            max_concurrent_events: 1,
            claim_idle_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the consumer ID
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the blocking read timeout
    pub fn with_block_timeout_ms(mut self, timeout: u64) -> Self {
        self.block_timeout_ms = timeout;
        self
    }

    /// Set the in-flight event bound
    pub fn with_max_concurrent_events(mut self, count: usize) -> Self {
        self.max_concurrent_events = count.max(1);
        self
    }

    /// Set the abandoned-message claim threshold
    pub fn with_claim_idle_ms(mut self, idle: u64) -> Self {
        self.claim_idle_ms = idle;
        self
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
