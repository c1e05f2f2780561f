// ============================================================================
// Driver Notifier Interface
// Hand-off from the matcher to whatever holds driver connections
// ============================================================================

use crate::domain::{AssignmentNotice, DriverId};
use async_trait::async_trait;

/// What happened to a driver-addressed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued on the driver's connection
    Enqueued,
    /// Queued, but the queue was full and its oldest message was discarded
    EnqueuedDroppedOldest,
    /// No live connection for that driver; nothing was delivered
    NotConnected,
    /// The message could not be encoded for the wire
    EncodeFailed,
    /// The hub has shut down
    HubStopped,
}

impl SendOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, SendOutcome::Enqueued | SendOutcome::EnqueuedDroppedOldest)
    }
}

#[async_trait]
pub trait DriverNotifier: Send + Sync {
    /// Never fails: a miss is reported through the outcome
    async fn notify_assignment(&self, driver_id: DriverId, notice: AssignmentNotice) -> SendOutcome;
}
