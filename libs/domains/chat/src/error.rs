//! Error types for the chat domain.

use crate::router::ProviderId;
use event_worker::ProcessingError;
use thiserror::Error;

/// Result type for chat domain operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors from the pipeline's collaborators.
///
/// Everything here is transient from the pipeline's point of view: the
/// collaborator was reachable-but-unhappy or unreachable, and a later
/// attempt may succeed. Structural validation errors never take this form;
/// they are produced directly as `ProcessingError::InvalidEvent`.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Context retrieval failed.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Generation backend failed.
    #[error("generation error via {provider}: {message}")]
    Generation {
        provider: ProviderId,
        message: String,
    },

    /// Result persistence failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Collaborator configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ChatError> for ProcessingError {
    fn from(e: ChatError) -> Self {
        ProcessingError::transient(e.to_string())
    }
}

impl From<core_config::ConfigError> for ChatError {
    fn from(e: core_config::ConfigError) -> Self {
        ChatError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_classify_as_transient() {
        let err: ProcessingError = ChatError::Retrieval("connection refused".to_string()).into();
        assert!(err.is_retryable());

        let err: ProcessingError = ChatError::Generation {
            provider: ProviderId::OpenAi,
            message: "timeout".to_string(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(err.reason().contains("openai"));
    }
}
