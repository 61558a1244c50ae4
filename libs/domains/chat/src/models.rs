//! Data models for the chat domain.

use crate::router::{ProviderId, RoutingContext};
use chrono::{DateTime, Utc};
use event_worker::PipelineEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant chat request, the pipeline's unit of work.
///
/// Wire shape (broker payload):
/// `{request_id, tenant_id, message, retries, created_at?, routing?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Correlation ID, assigned once at ingestion, immutable.
    pub request_id: String,

    /// Owning tenant.
    pub tenant_id: String,

    /// The message to process.
    pub message: String,

    /// Retries already made. Only the retry coordinator increments this.
    #[serde(rename = "retries", default)]
    pub retry_count: u32,

    /// Set at ingestion; defaults to now for payloads that omit it.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Routing hints supplied alongside the request.
    #[serde(default)]
    pub routing: RoutingContext,
}

impl ChatEvent {
    /// Create a fresh event at ingestion time.
    pub fn new(
        tenant_id: impl Into<String>,
        message: impl Into<String>,
        routing: RoutingContext,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            message: message.into(),
            retry_count: 0,
            created_at: Utc::now(),
            routing,
        }
    }
}

impl PipelineEvent for ChatEvent {
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

/// One ranked context snippet from retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub doc_id: String,
    pub content: String,
}

/// Output of one generation call.
///
/// Consumed once by the result sink; the pipeline does not retain it after
/// persistence succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Backend that produced the output.
    pub provider: ProviderId,
    /// Generated text.
    pub output: String,
}

/// A persisted result, as written to the results stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub request_id: String,
    pub provider: ProviderId,
    pub output: String,
    pub finished_at: DateTime<Utc>,
}

impl StoredResult {
    pub fn new(request_id: impl Into<String>, result: &GenerationResult) -> Self {
        Self {
            request_id: request_id.into(),
            provider: result.provider,
            output: result.output.clone(),
            finished_at: Utc::now(),
        }
    }
}
