// ============================================================================
// Event Handler Interface
// Defines the contract for observing dispatch events
// ============================================================================

use crate::domain::{BookingId, DriverId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the dispatcher while matching a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// Booking received by the dispatcher
    BookingReceived {
        booking_id: BookingId,
        timestamp: DateTime<Utc>,
    },

    /// Location index returned the candidate set
    CandidatesFound {
        booking_id: BookingId,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Candidate skipped because its lock is already held
    LockContended {
        booking_id: BookingId,
        driver_id: DriverId,
        timestamp: DateTime<Utc>,
    },

    /// Lock acquired but the assignment write failed; lock released
    AssignmentWriteFailed {
        booking_id: BookingId,
        driver_id: DriverId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Driver assigned and notified
    DriverAssigned {
        booking_id: BookingId,
        driver_id: DriverId,
        timestamp: DateTime<Utc>,
    },

    /// Booking was already assigned by an earlier delivery of the same request
    DuplicateBooking {
        booking_id: BookingId,
        driver_id: DriverId,
        timestamp: DateTime<Utc>,
    },

    /// Every candidate was exhausted
    NoDriversAvailable {
        booking_id: BookingId,
        timestamp: DateTime<Utc>,
    },
}

/// Event handler trait for processing dispatch events
/// Implementations can handle logging, metrics, lifecycle publication, etc.
pub trait EventHandler: Send + Sync {
    /// Handle a dispatch event
    fn on_event(&self, event: DispatchEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<DispatchEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: DispatchEvent) {}
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: DispatchEvent) {
        tracing::debug!("Dispatch event: {:?}", event);
    }
}
