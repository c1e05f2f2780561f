// ============================================================================
// Dispatch Errors
// Error taxonomy shared by the index, locks, matcher, hub and pipeline
// ============================================================================

use crate::domain::{BookingId, DriverId};
use thiserror::Error;

/// Backing key-value store failures. Always fail-closed: never read as
/// "empty" or "available".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Message queue failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(String),

    #[error("queue broker not available: {0}")]
    BrokerUnavailable(String),

    #[error("queue consumer closed")]
    Closed,

    #[error("queue error: {0}")]
    Other(String),
}

impl QueueError {
    /// Transport and broker failures mark the consumer disconnected and back off
    pub fn is_connection_error(&self) -> bool {
        matches!(self, QueueError::Transport(_) | QueueError::BrokerUnavailable(_))
    }
}

/// Assignment write failures reported by the booking persistence collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("booking {booking_id} already assigned to driver {driver_id}")]
    AlreadyAssigned {
        booking_id: BookingId,
        driver_id: DriverId,
    },

    #[error("assignment write failed: {0}")]
    WriteFailed(String),
}

/// Driver connection transport failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("no frame within {0:?}")]
    LivenessTimeout(std::time::Duration),

    #[error("write did not complete within {0:?}")]
    WriteTimeout(std::time::Duration),

    #[error("inbound frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("transport error: {0}")]
    Io(String),
}

/// Crate-level error
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error(transparent)]
    PersistenceFailure(#[from] PersistenceError),

    #[error("no drivers available for booking {booking_id}")]
    NoDriversAvailable { booking_id: BookingId },

    #[error("malformed booking request: {0}")]
    DeserializationFailure(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("notification hub is not running")]
    HubStopped,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DispatchError {
    /// Whether retrying the same booking moments later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::StoreUnavailable(_)
                | DispatchError::PersistenceFailure(PersistenceError::WriteFailed(_))
                | DispatchError::NoDriversAvailable { .. }
        )
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DispatchError::from(StoreError::Unavailable("connection refused".into()));
        assert_eq!(err.to_string(), "backing store unavailable: connection refused");

        let err = DispatchError::NoDriversAvailable {
            booking_id: BookingId::new(3),
        };
        assert_eq!(err.to_string(), "no drivers available for booking 3");

        let err = DispatchError::InvalidConfig("Lock TTL must be positive".into());
        assert_eq!(err.to_string(), "invalid configuration: Lock TTL must be positive");
    }

    #[test]
    fn test_retry_classification() {
        assert!(DispatchError::from(StoreError::Unavailable(String::new())).is_retryable());
        assert!(DispatchError::NoDriversAvailable {
            booking_id: BookingId::new(1)
        }
        .is_retryable());

        let poison = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(!DispatchError::from(poison).is_retryable());
        assert!(!DispatchError::from(PersistenceError::AlreadyAssigned {
            booking_id: BookingId::new(1),
            driver_id: DriverId::new(2),
        })
        .is_retryable());
    }

    #[test]
    fn test_queue_error_classification() {
        assert!(QueueError::Transport("reset".into()).is_connection_error());
        assert!(QueueError::BrokerUnavailable("down".into()).is_connection_error());
        assert!(!QueueError::Other("bad offset".into()).is_connection_error());
    }
}
