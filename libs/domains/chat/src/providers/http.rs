//! HTTP generation client.
//!
//! Each provider is an internal generation service endpoint; the client
//! keeps a per-provider endpoint table and posts the message plus its
//! retrieved context.

use super::GenerationClient;
use crate::error::{ChatError, ChatResult};
use crate::models::{ContextSnippet, GenerationResult};
use crate::router::ProviderId;
use async_trait::async_trait;
use core_config::{env_required, ConfigError, FromEnv};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};

/// One backend endpoint.
#[derive(Debug, Clone)]
pub struct GenerationEndpoint {
    /// Base URL of the generation service.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

impl GenerationEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Endpoint table for all known providers.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub endpoints: HashMap<ProviderId, GenerationEndpoint>,
}

impl GenerationConfig {
    pub fn new(endpoints: HashMap<ProviderId, GenerationEndpoint>) -> Self {
        Self { endpoints }
    }

    pub fn endpoint(&self, provider: ProviderId) -> Option<&GenerationEndpoint> {
        self.endpoints.get(&provider)
    }
}

impl FromEnv for GenerationConfig {
    /// Requires OPENAI_GENERATION_URL and OLLAMA_GENERATION_URL;
    /// OPENAI_API_KEY is attached when present.
    fn from_env() -> Result<Self, ConfigError> {
        let mut openai = GenerationEndpoint::new(env_required("OPENAI_GENERATION_URL")?);
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            openai = openai.with_api_key(api_key);
        }

        let ollama = GenerationEndpoint::new(env_required("OLLAMA_GENERATION_URL")?);

        Ok(Self::new(HashMap::from([
            (ProviderId::OpenAi, openai),
            (ProviderId::Ollama, ollama),
        ])))
    }
}

/// Backend response body.
#[derive(Debug, Deserialize)]
struct GenerationResponse {
    output: String,
}

/// HTTP client over the provider endpoint table.
pub struct HttpGenerationClient {
    config: GenerationConfig,
    client: Client,
}

impl HttpGenerationClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> ChatResult<Self> {
        Ok(Self::new(GenerationConfig::from_env()?))
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(
        &self,
        provider: ProviderId,
        message: &str,
        context: &[ContextSnippet],
    ) -> ChatResult<GenerationResult> {
        let endpoint = self.config.endpoint(provider).ok_or_else(|| {
            ChatError::Config(format!("no endpoint configured for provider {provider}"))
        })?;

        debug!(
            provider = %provider,
            context_snippets = context.len(),
            "Invoking generation backend"
        );

        let mut request = self
            .client
            .post(format!("{}/generate", endpoint.base_url))
            .json(&json!({ "message": message, "context": context }));

        if let Some(api_key) = &endpoint.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| ChatError::Generation {
            provider,
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Generation {
                provider,
                message: format!("backend returned {status}: {body}"),
            });
        }

        let body: GenerationResponse =
            response.json().await.map_err(|e| ChatError::Generation {
                provider,
                message: format!("undecodable response: {e}"),
            })?;

        info!(provider = %provider, "Generation complete");

        Ok(GenerationResult {
            provider,
            output: body.output,
        })
    }

    fn name(&self) -> &'static str {
        "HttpGenerationClient"
    }
}
