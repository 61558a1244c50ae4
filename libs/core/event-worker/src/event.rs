//! Event trait and delivery wrapper.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for pipeline event payloads.
///
/// Domain event types implement this so the worker can track, correlate,
/// and retry them.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct ChatEvent {
///     request_id: String,
///     tenant_id: String,
///     message: String,
///     retry_count: u32,
/// }
///
/// impl PipelineEvent for ChatEvent {
///     fn request_id(&self) -> String { self.request_id.clone() }
///     fn tenant_id(&self) -> String { self.tenant_id.clone() }
///     fn retry_count(&self) -> u32 { self.retry_count }
///     fn with_retry(&self) -> Self {
///         Self { retry_count: self.retry_count + 1, ..self.clone() }
///     }
/// }
/// ```
pub trait PipelineEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Correlation ID, assigned once at ingestion. Carried through retries
    /// and into the dead-letter record.
    fn request_id(&self) -> String;

    /// Owning tenant.
    fn tenant_id(&self) -> String;

    /// Number of retries already made for this event.
    fn retry_count(&self) -> u32;

    /// Copy of the event with the retry count incremented by one.
    /// Only the coordinator calls this; the count never decreases.
    fn with_retry(&self) -> Self;
}

/// An event as delivered from the stream, with broker metadata.
#[derive(Debug, Clone)]
pub struct Delivery<E: PipelineEvent> {
    /// Redis stream entry ID (e.g., "1234567890123-0")
    pub stream_id: String,

    /// The event payload
    pub event: E,

    /// When the entry was appended (parsed from the stream ID)
    pub enqueued_at: DateTime<Utc>,

    /// Broker-side delivery count. After a crash this is the fallback
    /// source of truth for how often the entry has been handed out.
    pub delivery_count: u32,
}

impl<E: PipelineEvent> Delivery<E> {
    pub fn new(stream_id: String, event: E) -> Self {
        Self::with_delivery_count(stream_id, event, 1)
    }

    pub fn with_delivery_count(stream_id: String, event: E, delivery_count: u32) -> Self {
        let enqueued_at = parse_stream_timestamp(&stream_id);
        Self {
            stream_id,
            event,
            enqueued_at,
            delivery_count,
        }
    }

    pub fn request_id(&self) -> String {
        self.event.request_id()
    }

    /// Whether the broker has handed this entry out before.
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }

    /// Time spent in the stream before this delivery.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.enqueued_at
    }
}

/// Stream IDs are "timestamp_ms-sequence".
fn parse_stream_timestamp(stream_id: &str) -> DateTime<Utc> {
    stream_id
        .split('-')
        .next()
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

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

    fn event() -> TestEvent {
        TestEvent {
            request_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            retry_count: 0,
        }
    }

    #[test]
    fn parses_timestamp_from_stream_id() {
        let now_ms = Utc::now().timestamp_millis();
        let delivery = Delivery::new(format!("{now_ms}-0"), event());

        assert!(delivery.age() < chrono::Duration::seconds(1));
        assert!(!delivery.is_redelivery());
    }

    #[test]
    fn tracks_redelivery() {
        let delivery = Delivery::with_delivery_count("1234567890123-0".to_string(), event(), 3);

        assert!(delivery.is_redelivery());
        assert_eq!(delivery.delivery_count, 3);
        assert_eq!(delivery.request_id(), "r1");
    }

    #[test]
    fn with_retry_increments_once() {
        let retried = event().with_retry();
        assert_eq!(retried.retry_count(), 1);
        assert_eq!(retried.with_retry().retry_count(), 2);
    }
}
