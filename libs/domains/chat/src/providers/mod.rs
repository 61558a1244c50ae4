//! Generation backends.
//!
//! The `GenerationClient` trait is the pipeline's only view of a backend;
//! which backend actually runs is the router's decision, passed in per
//! call.

mod http;

pub use http::{GenerationConfig, GenerationEndpoint, HttpGenerationClient};

use crate::error::ChatResult;
use crate::models::{ContextSnippet, GenerationResult};
use crate::router::ProviderId;
use async_trait::async_trait;

/// Invokes a generation backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a response to `message`, grounded in the retrieved context.
    async fn generate(
        &self,
        provider: ProviderId,
        message: &str,
        context: &[ContextSnippet],
    ) -> ChatResult<GenerationResult>;

    /// Client name for logging.
    fn name(&self) -> &'static str;
}
