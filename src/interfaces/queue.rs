// ============================================================================
// Booking Queue Interface
// Consumer-group poll over the durable booking-request topic
// ============================================================================

use crate::error::QueueError;
use async_trait::async_trait;
use std::time::Duration;

/// One record read from the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub partition: u32,
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// At-least-once consumer. Messages that are not acknowledged may be
/// delivered again, so processing must tolerate duplicates.
#[async_trait]
pub trait BookingQueue: Send {
    /// Wait up to `timeout` for the next message. `Ok(None)` means the
    /// timeout elapsed, which is not an error.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError>;

    /// Commit the message's offset for this consumer group
    async fn ack(&mut self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Leave the consumer group and release resources
    async fn close(&mut self);
}
