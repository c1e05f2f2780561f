// ============================================================================
// Ingestion Pipeline
// Queue consumer loop feeding booking requests to the dispatcher
// ============================================================================

use crate::domain::{AssignmentOutcome, BookingRequest, PipelineConfig};
use crate::engine::Dispatcher;
use crate::error::{DispatchError, QueueError};
use crate::ingest::health::PipelineHealth;
use crate::ingest::retry::{retry_with_backoff, RetryOutcome};
use crate::interfaces::{BookingQueue, QueueMessage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consumes booking requests at least once and drives the dispatcher.
///
/// Transient trouble (broker down, contention, failed writes) is absorbed by
/// backoff and surfaces only through [`PipelineHealth`]. Every handled
/// message is acknowledged, including poison messages and bookings that
/// exhausted their retries, so neither can block the partition.
pub struct IngestionPipeline {
    queue: Box<dyn BookingQueue>,
    dispatcher: Arc<Dispatcher>,
    config: PipelineConfig,
    health: Arc<PipelineHealth>,
}

impl IngestionPipeline {
    pub fn new(queue: Box<dyn BookingQueue>, dispatcher: Arc<Dispatcher>, config: PipelineConfig) -> Self {
        Self {
            queue,
            dispatcher,
            config,
            health: Arc::new(PipelineHealth::new()),
        }
    }

    /// Shared health state for the operator-facing endpoint
    pub fn health(&self) -> Arc<PipelineHealth> {
        Arc::clone(&self.health)
    }

    /// Poll until `cancel` fires or the consumer is closed underneath us.
    /// The consumer is closed on the way out.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(poll_timeout = ?self.config.poll_timeout, "Ingestion pipeline started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = self.queue.poll(self.config.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => self.health.set_connected(true),
                Ok(Some(message)) => {
                    self.health.set_connected(true);
                    if !self.handle(message, &cancel).await {
                        break;
                    }
                },
                Err(e) if e.is_connection_error() => {
                    self.health.set_connected(false);
                    self.health.record_error(&e);
                    warn!(error = %e, backoff = ?self.config.reconnect_backoff, "Queue connection error, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.reconnect_backoff) => {},
                    }
                },
                Err(QueueError::Closed) => {
                    self.health.set_connected(false);
                    self.health.record_error(&QueueError::Closed);
                    error!("Queue consumer closed, pipeline exiting");
                    break;
                },
                Err(e) => {
                    self.health.record_error(&e);
                    warn!(error = %e, "Error reading booking queue");
                },
            }
        }

        self.queue.close().await;
        info!("Ingestion pipeline stopped");
    }

    /// Process one message. Returns `false` when cancelled mid-retry; the
    /// message is then left unacknowledged for redelivery.
    async fn handle(&mut self, message: QueueMessage, cancel: &CancellationToken) -> bool {
        let request = match BookingRequest::from_json(&message.payload) {
            Ok(request) => request,
            Err(e) => {
                let e = DispatchError::from(e);
                self.health.record_error(&e);
                warn!(partition = message.partition, offset = message.offset, error = %e, "Dropping malformed booking request");
                self.ack(&message).await;
                return true;
            },
        };

        let booking_id = request.booking_id;
        let dispatcher = &self.dispatcher;
        let request = &request;

        let outcome = retry_with_backoff(&self.config.retry, cancel, |attempt| async move {
            debug!(booking_id = %booking_id, attempt, "Dispatching booking");
            assigned_or_retry(dispatcher.dispatch(request).await?)
        })
        .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                self.health.record_processed();
                info!(booking_id = %booking_id, driver_id = ?value.driver_id, attempts, "Booking processed");
            },
            RetryOutcome::Exhausted { error: e, attempts } => {
                self.health.record_error(&e);
                error!(booking_id = %booking_id, attempts, error = %e, "Booking failed after retries");
            },
            RetryOutcome::Cancelled { attempts } => {
                info!(booking_id = %booking_id, attempts, "Cancelled while retrying, leaving message for redelivery");
                return false;
            },
        }

        self.ack(&message).await;
        true
    }

    async fn ack(&mut self, message: &QueueMessage) {
        if let Err(e) = self.queue.ack(message).await {
            self.health.record_error(&e);
            warn!(offset = message.offset, error = %e, "Failed to acknowledge message");
        }
    }
}

/// No driver is worth another attempt: contention may clear moments later
fn assigned_or_retry(outcome: AssignmentOutcome) -> Result<AssignmentOutcome, DispatchError> {
    if outcome.is_assigned() {
        Ok(outcome)
    } else {
        Err(DispatchError::NoDriversAvailable {
            booking_id: outcome.booking_id,
        })
    }
}
