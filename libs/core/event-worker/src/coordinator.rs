//! Retry coordination: one event, one terminal state.
//!
//! ```text
//!          ┌───────────┐   success    ┌───────────┐
//! Pending ─► Processing ├────────────► Succeeded  │
//!          └─────┬─────┘              └───────────┘
//!    transient,  │  invalid event, or
//!    retries <   │  retries exhausted
//!    max         ▼                    ┌─────────────┐
//!          ┌───────────┐              │ Quarantined │
//!          │ Retrying  ├─────────────►└─────────────┘
//!          └───────────┘  (backoff, then Processing again)
//! ```
//!
//! The loop is deliberately iterative: retry depth is bounded by
//! `retry_count`, never by the call stack, so a sustained backend outage
//! cannot grow the stack.

use crate::config::RetryPolicy;
use crate::dlq::{DeadLetterRecord, DeadLetterSink, REASON_RETRIES_EXHAUSTED};
use crate::error::{ProcessingError, SinkError};
use crate::event::PipelineEvent;
use crate::metrics::MetricsRecorder;
use crate::worker::EventProcessor;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Terminal state of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The event was fully processed and persisted.
    Succeeded {
        /// Retries it took to get there.
        retries: u32,
    },
    /// The event was durably recorded in the dead-letter store.
    Quarantined {
        /// The failure reason written to the record.
        reason: String,
    },
}

/// Drives one owned event through processing attempts to a terminal state.
///
/// The coordinator owns every retry decision; processors classify failures
/// and never retry internally.
pub struct RetryCoordinator<E, P>
where
    E: PipelineEvent,
    P: EventProcessor<E>,
{
    processor: Arc<P>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<dyn MetricsRecorder>,
    policy: RetryPolicy,
    service: String,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, P> RetryCoordinator<E, P>
where
    E: PipelineEvent,
    P: EventProcessor<E>,
{
    pub fn new(
        processor: Arc<P>,
        dead_letters: Arc<dyn DeadLetterSink>,
        metrics: Arc<dyn MetricsRecorder>,
        policy: RetryPolicy,
        service: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            dead_letters,
            metrics,
            policy,
            service: service.into(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive `event` to a terminal state.
    ///
    /// Returns `Err` only when a dead-letter write fails; in that case the
    /// caller must withhold the broker acknowledgement so the event is
    /// redelivered.
    pub async fn drive(&self, mut event: E) -> Result<Terminal, SinkError> {
        let request_id = event.request_id();

        // An event already past the retry cap is terminal; it is never
        // handed to the processor again, only recorded.
        if event.retry_count() > self.policy.max_retries {
            warn!(
                request_id = %request_id,
                retries = event.retry_count(),
                "Event arrived past the retry cap, quarantining"
            );
            return self.quarantine(&event, REASON_RETRIES_EXHAUSTED).await;
        }

        loop {
            debug!(
                request_id = %request_id,
                attempt = event.retry_count() + 1,
                processor = %self.processor.name(),
                "Processing event"
            );

            match self.processor.process(&event).await {
                Ok(()) => {
                    info!(
                        request_id = %request_id,
                        retries = event.retry_count(),
                        "Event processed successfully"
                    );
                    return Ok(Terminal::Succeeded {
                        retries: event.retry_count(),
                    });
                }
                Err(ProcessingError::InvalidEvent(reason)) => {
                    // A structural defect cannot be fixed by retrying.
                    warn!(
                        request_id = %request_id,
                        reason = %reason,
                        "Invalid event, quarantining without retry"
                    );
                    return self.quarantine(&event, &reason).await;
                }
                Err(ProcessingError::Transient(reason)) => {
                    if event.retry_count() >= self.policy.max_retries {
                        warn!(
                            request_id = %request_id,
                            retries = event.retry_count(),
                            error = %reason,
                            "Retries exhausted, quarantining"
                        );
                        return self.quarantine(&event, REASON_RETRIES_EXHAUSTED).await;
                    }

                    // Exponent = retries already made before this wait.
                    let backoff = self.policy.backoff_delay(event.retry_count());
                    event = event.with_retry();
                    self.metrics.retry(&self.service);

                    warn!(
                        request_id = %request_id,
                        retry = event.retry_count(),
                        backoff_secs = backoff.as_secs(),
                        error = %reason,
                        "Retrying event after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Quarantine a payload that failed to decode into an event at all.
    pub async fn quarantine_poison(
        &self,
        stream_id: &str,
        payload: &str,
        decode_error: &str,
    ) -> Result<(), SinkError> {
        let record = DeadLetterRecord::poison(stream_id, payload, decode_error);
        self.write_record(&record).await.map(|_| ())
    }

    async fn quarantine(&self, event: &E, reason: &str) -> Result<Terminal, SinkError> {
        let record = DeadLetterRecord::from_event(event, reason)?;
        self.write_record(&record).await?;

        Ok(Terminal::Quarantined {
            reason: reason.to_string(),
        })
    }

    async fn write_record(&self, record: &DeadLetterRecord) -> Result<bool, SinkError> {
        match self.dead_letters.quarantine(record).await {
            Ok(newly_written) => {
                if newly_written {
                    self.metrics.quarantined(&self.service);
                }
                Ok(newly_written)
            }
            Err(e) => {
                error!(
                    request_id = %record.request_id,
                    error = %e,
                    "Failed to write dead-letter record; withholding ack so the broker redelivers"
                );
                Err(e)
            }
        }
    }
}
