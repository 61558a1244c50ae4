//! Chat Generation Domain
//!
//! One `ChatEvent` is one tenant chat request flowing through the pipeline:
//!
//! ```text
//! Redis Stream (chat:events)
//!   ↓ (Consumer Group: chat_workers)
//! PipelineWorker<ChatEvent, ChatProcessor>
//!   ↓ validate → retrieve context → route + generate → persist
//! Redis Stream (chat:results)
//! ```
//!
//! Retrieval, generation, and persistence sit behind narrow traits
//! (`ContextRetriever`, `GenerationClient`, `ResultSink`) so the processor
//! stays testable and the backing services stay swappable.

mod error;
mod models;
mod processor;
mod providers;
mod retrieval;
mod router;
mod sink;
mod streams;

pub use error::{ChatError, ChatResult};
pub use models::{ChatEvent, ContextSnippet, GenerationResult, StoredResult};
pub use processor::{ChatProcessor, SERVICE_NAME};
pub use providers::{GenerationClient, GenerationConfig, GenerationEndpoint, HttpGenerationClient};
pub use retrieval::{ContextRetriever, HttpContextRetriever, RetrievalConfig};
pub use router::{ProviderId, ProviderRouter, RoutingContext, RoutingRule, HINT_LOW_COST};
pub use sink::{ResultSink, StreamResultSink};
pub use streams::{ChatResultStream, ChatStream};
