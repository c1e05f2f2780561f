// ============================================================================
// Assignment Recorder Interface
// Durable write of "booking X is served by driver Y"
// ============================================================================

use crate::domain::{BookingId, DriverId};
use crate::error::PersistenceError;
use async_trait::async_trait;

/// Booking persistence collaborator.
///
/// Implementations must be unique on `BookingId`: recording a booking that is
/// already assigned returns [`PersistenceError::AlreadyAssigned`] naming the
/// existing driver. That uniqueness is what makes queue redelivery safe.
#[async_trait]
pub trait AssignmentRecorder: Send + Sync {
    async fn record_assignment(
        &self,
        booking_id: BookingId,
        driver_id: DriverId,
    ) -> Result<(), PersistenceError>;

    /// Driver already recorded for `booking_id`, if any
    async fn assigned_driver(&self, booking_id: BookingId) -> Result<Option<DriverId>, PersistenceError>;
}
