// ============================================================================
// Booking Domain Model
// ============================================================================

use super::{BookingId, DriverId, Location, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ride request as produced by the booking service. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub pickup_location: Location,
    pub dropoff_location: Location,
    #[serde(with = "rust_decimal::serde::float")]
    pub fare_amount: Decimal,
}

impl BookingRequest {
    pub fn new(
        booking_id: BookingId,
        user_id: UserId,
        pickup_location: Location,
        dropoff_location: Location,
        fare_amount: Decimal,
    ) -> Self {
        Self {
            booking_id,
            user_id,
            pickup_location,
            dropoff_location,
            fare_amount,
        }
    }

    /// Decode a queue payload
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    DriverAssigned,
    NoDriversAvailable,
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStatus::DriverAssigned => write!(f, "DRIVER_ASSIGNED"),
            AssignmentStatus::NoDriversAvailable => write!(f, "NO_DRIVERS_AVAILABLE"),
        }
    }
}

/// Result of one match attempt. Returned or delivered, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub booking_id: BookingId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<DriverId>,
    pub status: AssignmentStatus,
}

impl AssignmentOutcome {
    pub fn assigned(booking_id: BookingId, driver_id: DriverId) -> Self {
        Self {
            booking_id,
            driver_id: Some(driver_id),
            status: AssignmentStatus::DriverAssigned,
        }
    }

    pub fn no_drivers(booking_id: BookingId) -> Self {
        Self {
            booking_id,
            driver_id: None,
            status: AssignmentStatus::NoDriversAvailable,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.status == AssignmentStatus::DriverAssigned
    }
}

/// Booking-shaped payload pushed to the assigned driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentNotice {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub pickup_location: Location,
    pub dropoff_location: Location,
    #[serde(with = "rust_decimal::serde::float")]
    pub fare_amount: Decimal,
    pub status: AssignmentStatus,
}

impl From<&BookingRequest> for AssignmentNotice {
    fn from(request: &BookingRequest) -> Self {
        Self {
            booking_id: request.booking_id,
            user_id: request.user_id,
            pickup_location: request.pickup_location,
            dropoff_location: request.dropoff_location,
            fare_amount: request.fare_amount,
            status: AssignmentStatus::DriverAssigned,
        }
    }
}
