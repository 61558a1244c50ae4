//! Chat event processor.
//!
//! One `process` call is one attempt at the full sequence:
//! validate → retrieve → generate → persist. The stages are idempotent and
//! recomputable, so a retry reruns everything from validation; no partial
//! state survives between attempts.

use crate::models::ChatEvent;
use crate::providers::GenerationClient;
use crate::retrieval::ContextRetriever;
use crate::router::ProviderRouter;
use crate::sink::ResultSink;
use async_trait::async_trait;
use event_worker::{AttemptTimer, EventProcessor, MetricsRecorder, ProcessingError, WorkerError};
use std::sync::Arc;
use tracing::{debug, info};

/// Metric label for this pipeline.
pub const SERVICE_NAME: &str = "chat-pipeline";

/// Orchestrates retrieval, generation, and persistence for one event.
///
/// Classifies failures and returns; every retry decision belongs to the
/// coordinator.
pub struct ChatProcessor {
    router: ProviderRouter,
    retriever: Arc<dyn ContextRetriever>,
    generator: Arc<dyn GenerationClient>,
    results: Arc<dyn ResultSink>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ChatProcessor {
    pub fn new(
        router: ProviderRouter,
        retriever: Arc<dyn ContextRetriever>,
        generator: Arc<dyn GenerationClient>,
        results: Arc<dyn ResultSink>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            router,
            retriever,
            generator,
            results,
            metrics,
        }
    }

    /// Structural validation, always the first stage.
    ///
    /// Runs before any collaborator is touched so an invalid event makes
    /// zero external calls.
    fn validate(event: &ChatEvent) -> Result<(), ProcessingError> {
        if event.tenant_id.trim().is_empty() {
            return Err(ProcessingError::invalid_event("tenant_id is empty"));
        }
        if event.message.trim().is_empty() {
            return Err(ProcessingError::invalid_event("message is empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl EventProcessor<ChatEvent> for ChatProcessor {
    async fn process(&self, event: &ChatEvent) -> Result<(), ProcessingError> {
        // Records the attempt count and latency on every exit path.
        let _timer = AttemptTimer::start(self.metrics.clone(), SERVICE_NAME);

        Self::validate(event)?;

        let snippets = self
            .retriever
            .retrieve(&event.message, &event.tenant_id)
            .await
            .map_err(ProcessingError::from)?;

        debug!(
            request_id = %event.request_id,
            snippets = snippets.len(),
            "Context retrieved"
        );

        let provider = self.router.select_provider(&event.routing);

        let result = match self
            .generator
            .generate(provider, &event.message, &snippets)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.metrics.generation_error(provider.as_ref());
                return Err(e.into());
            }
        };

        self.results
            .persist(&event.request_id, &result)
            .await
            .map_err(ProcessingError::from)?;

        info!(
            request_id = %event.request_id,
            tenant_id = %event.tenant_id,
            provider = %result.provider,
            "Chat event processed"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ChatProcessor"
    }

    async fn health_check(&self) -> Result<bool, WorkerError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::models::{ContextSnippet, GenerationResult};
    use crate::providers::MockGenerationClient;
    use crate::retrieval::MockContextRetriever;
    use crate::router::{ProviderId, RoutingContext, HINT_LOW_COST};
    use crate::sink::MockResultSink;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMetrics {
        requests: AtomicU32,
        generation_errors: Mutex<Vec<String>>,
    }

    impl MetricsRecorder for RecordingMetrics {
        fn request(&self, _service: &str) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
        fn latency(&self, _service: &str, _seconds: f64) {}
        fn generation_error(&self, provider: &str) {
            self.generation_errors
                .lock()
                .unwrap()
                .push(provider.to_string());
        }
        fn retry(&self, _service: &str) {}
        fn quarantined(&self, _service: &str) {}
    }

    fn event(tenant_id: &str, message: &str) -> ChatEvent {
        ChatEvent {
            request_id: "r1".to_string(),
            tenant_id: tenant_id.to_string(),
            message: message.to_string(),
            retry_count: 0,
            created_at: chrono::Utc::now(),
            routing: RoutingContext::default(),
        }
    }

    fn processor(
        retriever: MockContextRetriever,
        generator: MockGenerationClient,
        results: MockResultSink,
        metrics: Arc<RecordingMetrics>,
    ) -> ChatProcessor {
        ChatProcessor::new(
            ProviderRouter::default(),
            Arc::new(retriever),
            Arc::new(generator),
            Arc::new(results),
            metrics,
        )
    }

    #[tokio::test]
    async fn happy_path_runs_all_stages_in_order() {
        let mut retriever = MockContextRetriever::new();
        retriever
            .expect_retrieve()
            .withf(|query, tenant| query == "hello" && tenant == "t1")
            .times(1)
            .returning(|_, _| {
                Ok(vec![ContextSnippet {
                    doc_id: "doc-1".to_string(),
                    content: "Relevant context snippet".to_string(),
                }])
            });

        let mut generator = MockGenerationClient::new();
        generator
            .expect_generate()
            .withf(|provider, message, context| {
                *provider == ProviderId::OpenAi && message == "hello" && context.len() == 1
            })
            .times(1)
            .returning(|provider, _, _| {
                Ok(GenerationResult {
                    provider,
                    output: "Generated response".to_string(),
                })
            });

        let mut results = MockResultSink::new();
        results
            .expect_persist()
            .withf(|request_id, result| request_id == "r1" && result.output == "Generated response")
            .times(1)
            .returning(|_, _| Ok(()));

        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics.clone());

        processor.process(&event("t1", "hello")).await.unwrap();

        assert_eq!(metrics.requests.load(Ordering::SeqCst), 1);
        assert!(metrics.generation_errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_tenant_fails_validation_with_no_collaborator_calls() {
        // No expectations: any collaborator call would panic the test.
        let retriever = MockContextRetriever::new();
        let generator = MockGenerationClient::new();
        let results = MockResultSink::new();
        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics.clone());

        let err = processor
            .process(&event("   ", "hello"))
            .await
            .unwrap_err();

        assert_eq!(err, ProcessingError::invalid_event("tenant_id is empty"));
        // The attempt is still measured.
        assert_eq!(metrics.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn whitespace_message_fails_validation() {
        let retriever = MockContextRetriever::new();
        let generator = MockGenerationClient::new();
        let results = MockResultSink::new();
        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics);

        let err = processor.process(&event("t1", " \t\n")).await.unwrap_err();

        assert_eq!(err, ProcessingError::invalid_event("message is empty"));
    }

    #[tokio::test]
    async fn empty_retrieval_is_not_an_error() {
        let mut retriever = MockContextRetriever::new();
        retriever.expect_retrieve().returning(|_, _| Ok(vec![]));

        let mut generator = MockGenerationClient::new();
        generator
            .expect_generate()
            .withf(|_, _, context| context.is_empty())
            .times(1)
            .returning(|provider, _, _| {
                Ok(GenerationResult {
                    provider,
                    output: "ok".to_string(),
                })
            });

        let mut results = MockResultSink::new();
        results.expect_persist().returning(|_, _| Ok(()));

        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics);

        processor.process(&event("t1", "hello")).await.unwrap();
    }

    #[tokio::test]
    async fn low_cost_hint_reaches_the_low_cost_backend() {
        let mut retriever = MockContextRetriever::new();
        retriever.expect_retrieve().returning(|_, _| Ok(vec![]));

        let mut generator = MockGenerationClient::new();
        generator
            .expect_generate()
            .withf(|provider, _, _| *provider == ProviderId::Ollama)
            .times(1)
            .returning(|provider, _, _| {
                Ok(GenerationResult {
                    provider,
                    output: "cheap".to_string(),
                })
            });

        let mut results = MockResultSink::new();
        results.expect_persist().returning(|_, _| Ok(()));

        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics);

        let mut event = event("t1", "hello");
        event.routing = RoutingContext::new().with_hint(HINT_LOW_COST, "true");

        processor.process(&event).await.unwrap();
    }

    #[tokio::test]
    async fn generation_failure_is_transient_and_labeled() {
        let mut retriever = MockContextRetriever::new();
        retriever.expect_retrieve().returning(|_, _| Ok(vec![]));

        let mut generator = MockGenerationClient::new();
        generator.expect_generate().returning(|provider, _, _| {
            Err(ChatError::Generation {
                provider,
                message: "backend unavailable".to_string(),
            })
        });

        let results = MockResultSink::new();
        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics.clone());

        let err = processor.process(&event("t1", "hello")).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(
            *metrics.generation_errors.lock().unwrap(),
            vec!["openai".to_string()]
        );
    }

    #[tokio::test]
    async fn persistence_failure_is_transient() {
        let mut retriever = MockContextRetriever::new();
        retriever.expect_retrieve().returning(|_, _| Ok(vec![]));

        let mut generator = MockGenerationClient::new();
        generator.expect_generate().returning(|provider, _, _| {
            Ok(GenerationResult {
                provider,
                output: "ok".to_string(),
            })
        });

        let mut results = MockResultSink::new();
        results
            .expect_persist()
            .returning(|_, _| Err(ChatError::Persistence("result store down".to_string())));

        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics.clone());

        let err = processor.process(&event("t1", "hello")).await.unwrap_err();

        assert!(err.is_retryable());
        // Persistence failures are not provider errors.
        assert!(metrics.generation_errors.lock().unwrap().is_empty());
        assert_eq!(metrics.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retrieval_failure_is_transient() {
        let mut retriever = MockContextRetriever::new();
        retriever
            .expect_retrieve()
            .returning(|_, _| Err(ChatError::Retrieval("vector store timeout".to_string())));

        let generator = MockGenerationClient::new();
        let results = MockResultSink::new();
        let metrics = Arc::new(RecordingMetrics::default());
        let processor = processor(retriever, generator, results, metrics);

        let err = processor.process(&event("t1", "hello")).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(err.reason().contains("vector store timeout"));
    }
}
