//! Processor trait and the generic pipeline worker.

use crate::config::WorkerConfig;
use crate::consumer::{PoisonMessage, ReadOutcome, StreamConsumer};
use crate::coordinator::{RetryCoordinator, Terminal};
use crate::error::{ProcessingError, WorkerError};
use crate::event::{Delivery, PipelineEvent};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Trait for event processors.
///
/// One `process` call is one attempt. The processor classifies failures
/// (`InvalidEvent` vs `Transient`) and never retries internally; all retry
/// decisions belong to the coordinator.
#[async_trait]
pub trait EventProcessor<E: PipelineEvent>: Send + Sync {
    /// Process a single event to completion, persistence included.
    ///
    /// Partial progress must not be reported as success: a failure after
    /// generation but before persistence is still an error, and the whole
    /// sequence reruns on retry.
    async fn process(&self, event: &E) -> Result<(), ProcessingError>;

    /// Processor name for logging.
    fn name(&self) -> &'static str;

    /// Health check for the processor's collaborators.
    async fn health_check(&self) -> Result<bool, WorkerError> {
        Ok(true)
    }
}

/// Generic pipeline worker.
///
/// Reads event batches from a consumer group and drives each event through
/// the retry coordinator to a terminal state before acknowledging it.
/// Independent events may be processed concurrently (bounded by
/// `max_concurrent_events`); a single event is always owned by exactly one
/// coordinator invocation.
pub struct PipelineWorker<E, P>
where
    E: PipelineEvent,
    P: EventProcessor<E>,
{
    consumer: StreamConsumer,
    coordinator: Arc<RetryCoordinator<E, P>>,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
}

impl<E, P> PipelineWorker<E, P>
where
    E: PipelineEvent + 'static,
    P: EventProcessor<E> + 'static,
{
    pub fn new(
        redis: Arc<ConnectionManager>,
        coordinator: RetryCoordinator<E, P>,
        config: WorkerConfig,
    ) -> Self {
        let consumer = StreamConsumer::new(redis, config.clone());
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_events));

        Self {
            consumer,
            coordinator: Arc::new(coordinator),
            config,
            semaphore,
        }
    }

    /// Consumer handle for health checks.
    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Run the worker loop until shutdown.
    ///
    /// Shutdown stops the intake of new batches; events already in flight
    /// finish their retry cycle (backoff waits included) before this
    /// returns.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.coordinator.processor().name(),
            max_concurrent_events = %self.config.max_concurrent_events,
            batch_size = %self.config.batch_size,
            "Starting pipeline worker"
        );

        self.consumer.ensure_consumer_group().await?;

        let claim_interval = Duration::from_millis(self.config.claim_idle_ms * 2);
        let mut last_claim = std::time::Instant::now();
        let mut consecutive_errors: u32 = 0;
        const MAX_READ_BACKOFF_SECS: u64 = 30;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            match self.process_batch().await {
                Ok(()) => {
                    if consecutive_errors > 0 {
                        info!(
                            errors = consecutive_errors,
                            "Broker connection recovered"
                        );
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        // No messages within the BLOCK window; not an error.
                        continue;
                    }

                    consecutive_errors += 1;

                    if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.consumer.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else if e.is_connection_error() {
                        let backoff_secs = std::cmp::min(
                            2u64.saturating_pow(consecutive_errors.min(5)),
                            MAX_READ_BACKOFF_SECS,
                        );
                        warn!(
                            error = %e,
                            consecutive_errors = %consecutive_errors,
                            backoff_secs = %backoff_secs,
                            "Broker connection error, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    } else {
                        error!(error = %e, "Error processing batch");
                    }

                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }

            if last_claim.elapsed() >= claim_interval {
                match self.consumer.claim_abandoned::<E>().await {
                    Ok(claimed) if !claimed.is_empty() => self.dispatch(claimed).await,
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "Error claiming abandoned entries"),
                }
                last_claim = std::time::Instant::now();
            }
        }

        info!("Pipeline worker stopped");
        Ok(())
    }

    /// Read one batch (pending first, then new) and drive every entry to a
    /// terminal state.
    async fn process_batch(&self) -> Result<(), WorkerError> {
        let pending = self.consumer.read_pending::<E>().await?;
        let fresh = self.consumer.read_new::<E>().await?;
        let batch = pending.merge(fresh);

        if batch.is_empty() {
            return Ok(());
        }

        self.dispatch(batch).await;
        Ok(())
    }

    /// Dispatch a batch: poison entries are dead-lettered directly, decoded
    /// events go through the coordinator, concurrently up to the semaphore
    /// bound. Returns once every entry of the batch is terminal.
    async fn dispatch(&self, batch: ReadOutcome<E>) {
        for poison in &batch.poison {
            self.handle_poison(poison).await;
        }

        if self.config.max_concurrent_events == 1 {
            for delivery in batch.deliveries {
                Self::handle_delivery(&self.coordinator, &self.consumer, delivery).await;
            }
            return;
        }

        let mut join_set: JoinSet<()> = JoinSet::new();

        for delivery in batch.deliveries {
            let semaphore = Arc::clone(&self.semaphore);
            let coordinator = Arc::clone(&self.coordinator);
            let consumer = self.consumer.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                Self::handle_delivery(&coordinator, &consumer, delivery).await;
            });
        }

        while join_set.join_next().await.is_some() {}
    }

    /// Drive one delivery to a terminal state, then acknowledge it.
    ///
    /// A dead-letter write failure leaves the entry unacknowledged on
    /// purpose: the broker will redeliver it, and the quarantine write gets
    /// another chance.
    async fn handle_delivery(
        coordinator: &Arc<RetryCoordinator<E, P>>,
        consumer: &StreamConsumer,
        delivery: Delivery<E>,
    ) {
        let stream_id = delivery.stream_id.clone();
        let request_id = delivery.request_id();

        if delivery.is_redelivery() {
            debug!(
                request_id = %request_id,
                delivery_count = delivery.delivery_count,
                "Handling redelivered event"
            );
        }

        match coordinator.drive(delivery.event).await {
            Ok(Terminal::Succeeded { retries }) => {
                debug!(request_id = %request_id, retries, "Event succeeded, acknowledging");
                Self::ack(consumer, &stream_id).await;
            }
            Ok(Terminal::Quarantined { reason }) => {
                // Quarantine is the resolution; the entry must not redeliver.
                debug!(request_id = %request_id, reason = %reason, "Event quarantined, acknowledging");
                Self::ack(consumer, &stream_id).await;
            }
            Err(e) => {
                error!(
                    request_id = %request_id,
                    stream_id = %stream_id,
                    error = %e,
                    "Dead-letter write failed; leaving entry pending for redelivery"
                );
            }
        }
    }

    async fn handle_poison(&self, poison: &PoisonMessage) {
        match self
            .coordinator
            .quarantine_poison(&poison.stream_id, &poison.payload, &poison.error)
            .await
        {
            Ok(()) => Self::ack(&self.consumer, &poison.stream_id).await,
            Err(e) => {
                error!(
                    stream_id = %poison.stream_id,
                    error = %e,
                    "Failed to dead-letter undecodable entry; leaving it pending"
                );
            }
        }
    }

    async fn ack(consumer: &StreamConsumer, stream_id: &str) {
        if let Err(e) = consumer.ack(stream_id).await {
            error!(stream_id = %stream_id, error = %e, "Failed to acknowledge entry");
        }
    }
}
