//! Pipeline error taxonomy.
//!
//! Three distinct failure surfaces, kept separate on purpose:
//! - `ProcessingError` classifies a single processing attempt and decides
//!   retry behavior: invalid events are never retried, transient failures
//!   are retried under the backoff policy.
//! - `SinkError` covers dead-letter writes. Losing a dead-letter record is
//!   worse than reprocessing, so these block acknowledgement.
//! - `WorkerError` covers the consumer loop itself (broker connectivity,
//!   consumer-group state, payload decoding).

use thiserror::Error;

/// Failure of a single processing attempt.
///
/// Produced by an `EventProcessor`; the processor classifies, the
/// `RetryCoordinator` decides what to do about it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// Structurally malformed event (missing/empty required field).
    /// Never retried; routed straight to quarantine.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Retrieval, generation, or persistence failure (network error,
    /// backend unavailable, timeout). Retryable under the backoff policy.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl ProcessingError {
    /// Create a non-retryable validation error.
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        ProcessingError::InvalidEvent(reason.into())
    }

    /// Create a retryable failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        ProcessingError::Transient(reason.into())
    }

    /// Whether the coordinator may schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessingError::Transient(_))
    }

    /// The human-readable failure reason, without the variant prefix.
    pub fn reason(&self) -> &str {
        match self {
            ProcessingError::InvalidEvent(reason) | ProcessingError::Transient(reason) => reason,
        }
    }
}

/// Dead-letter write failure.
///
/// Fatal to the current handling attempt: the event's acknowledgement must
/// be withheld so the broker redelivers it.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Record could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(err.to_string())
    }
}

/// Consumer-loop errors (broker connectivity, group state, decoding).
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkerError {
    /// Whether this is a broker connection failure worth backing off on.
    pub fn is_connection_error(&self) -> bool {
        match self {
            WorkerError::Redis(e) => {
                e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error()
            }
            _ => false,
        }
    }

    /// Whether the consumer group has gone missing and must be recreated.
    pub fn is_nogroup_error(&self) -> bool {
        match self {
            WorkerError::Redis(e) => e.to_string().contains("NOGROUP"),
            _ => false,
        }
    }

    /// Whether this is a read timeout (no messages within the BLOCK window).
    pub fn is_timeout(&self) -> bool {
        match self {
            WorkerError::Redis(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Serialization(err.to_string())
    }
}

impl From<core_config::ConfigError> for WorkerError {
    fn from(err: core_config::ConfigError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_event_is_not_retryable() {
        let err = ProcessingError::invalid_event("tenant_id is empty");
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), "tenant_id is empty");
    }

    #[test]
    fn transient_is_retryable() {
        let err = ProcessingError::transient("backend unavailable");
        assert!(err.is_retryable());
        assert_eq!(err.reason(), "backend unavailable");
    }

    #[test]
    fn display_includes_classification() {
        let invalid = ProcessingError::invalid_event("message is empty");
        assert!(invalid.to_string().contains("invalid event"));

        let transient = ProcessingError::transient("timeout");
        assert!(transient.to_string().contains("transient failure"));
    }
}
