//! Context retrieval.
//!
//! The retrieval service owns the vector search; this side only knows the
//! narrow interface: a query and tenant in, ranked snippets out. No result
//! is a valid result.

use crate::error::{ChatError, ChatResult};
use crate::models::ContextSnippet;
use async_trait::async_trait;
use core_config::{env_required, ConfigError, FromEnv};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// Returns ranked context snippets for a query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Retrieve context for `query` scoped to `tenant_id`.
    ///
    /// The sequence is ordered by relevance and may be empty; "no results"
    /// is not an error.
    async fn retrieve(&self, query: &str, tenant_id: &str) -> ChatResult<Vec<ContextSnippet>>;
}

/// Retrieval service configuration.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Base URL of the retrieval service.
    pub base_url: String,
}

impl RetrievalConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl FromEnv for RetrievalConfig {
    /// Requires RETRIEVAL_URL to be set.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_required("RETRIEVAL_URL")?,
        })
    }
}

/// HTTP client for the retrieval service.
pub struct HttpContextRetriever {
    config: RetrievalConfig,
    client: Client,
}

impl HttpContextRetriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> ChatResult<Self> {
        Ok(Self::new(RetrievalConfig::from_env()?))
    }
}

#[async_trait]
impl ContextRetriever for HttpContextRetriever {
    async fn retrieve(&self, query: &str, tenant_id: &str) -> ChatResult<Vec<ContextSnippet>> {
        let response = self
            .client
            .post(format!("{}/retrieve", self.config.base_url))
            .json(&json!({ "query": query, "tenant_id": tenant_id }))
            .send()
            .await
            .map_err(|e| ChatError::Retrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Retrieval(format!(
                "retrieval service returned {status}: {body}"
            )));
        }

        let snippets: Vec<ContextSnippet> = response
            .json()
            .await
            .map_err(|e| ChatError::Retrieval(format!("undecodable response: {e}")))?;

        debug!(
            tenant_id = %tenant_id,
            snippets = snippets.len(),
            "Retrieved context"
        );

        Ok(snippets)
    }
}
