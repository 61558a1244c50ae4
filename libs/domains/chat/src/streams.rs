//! Stream definitions for the chat domain.

use event_worker::StreamDef;

/// Inbound chat events.
pub struct ChatStream;

impl StreamDef for ChatStream {
    /// Stream name for tenant chat events.
    const STREAM_NAME: &'static str = "chat:events";

    /// Consumer group for chat workers.
    const CONSUMER_GROUP: &'static str = "chat_workers";

    /// Dead-letter hash for quarantined events.
    const DEAD_LETTER_KEY: &'static str = "chat:dlq";
}

/// Completed generation results.
pub struct ChatResultStream;

impl StreamDef for ChatResultStream {
    const STREAM_NAME: &'static str = "chat:results";

    const CONSUMER_GROUP: &'static str = "chat_result_readers";

    const DEAD_LETTER_KEY: &'static str = "chat:results:dlq";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_stream_def() {
        assert_eq!(ChatStream::stream_name(), "chat:events");
        assert_eq!(ChatStream::consumer_group(), "chat_workers");
        assert_eq!(ChatStream::dead_letter_key(), "chat:dlq");
        assert_eq!(ChatStream::MAX_LENGTH, 100_000);
    }

    #[test]
    fn result_stream_def() {
        assert_eq!(ChatResultStream::stream_name(), "chat:results");
    }
}
