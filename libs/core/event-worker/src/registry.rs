//! Stream definitions.
//!
//! Each domain implements `StreamDef` to name its stream, consumer group,
//! and dead-letter key in one place, shared by producer, worker, and admin
//! endpoints.

/// Stream definition trait.
///
/// # Example
///
/// ```rust,ignore
/// pub struct ChatStream;
///
/// impl StreamDef for ChatStream {
///     const STREAM_NAME: &'static str = "chat:events";
///     const CONSUMER_GROUP: &'static str = "chat_workers";
///     const DEAD_LETTER_KEY: &'static str = "chat:dlq";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// The Redis stream name (e.g., "chat:events").
    const STREAM_NAME: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// The dead-letter hash key for quarantined events.
    const DEAD_LETTER_KEY: &'static str;

    /// Maximum stream length before approximate trimming (MAXLEN ~).
    const MAX_LENGTH: i64 = 100_000;

    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }

    fn dead_letter_key() -> &'static str {
        Self::DEAD_LETTER_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestStream;
    impl StreamDef for TestStream {
        const STREAM_NAME: &'static str = "test:events";
        const CONSUMER_GROUP: &'static str = "test_workers";
        const DEAD_LETTER_KEY: &'static str = "test:dlq";
    }

    #[test]
    fn stream_def_accessors() {
        assert_eq!(TestStream::stream_name(), "test:events");
        assert_eq!(TestStream::consumer_group(), "test_workers");
        assert_eq!(TestStream::dead_letter_key(), "test:dlq");
        assert_eq!(TestStream::MAX_LENGTH, 100_000);
    }
}
