// ============================================================================
// In-Memory Assignment Ledger
// Assignment recorder with booking-id uniqueness and failure injection
// ============================================================================

use crate::domain::{BookingId, DriverId};
use crate::error::PersistenceError;
use crate::interfaces::AssignmentRecorder;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    assignments: Mutex<HashMap<BookingId, DriverId>>,
    failing_drivers: Mutex<HashSet<DriverId>>,
    fail_next: AtomicU32,
    writes: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` writes fail with `WriteFailed`
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_next.store(count, Ordering::Release);
    }

    /// Every write naming `driver_id` fails until cleared
    pub fn fail_for_driver(&self, driver_id: DriverId) {
        self.failing_drivers.lock().insert(driver_id);
    }

    pub fn clear_failures(&self) {
        self.failing_drivers.lock().clear();
        self.fail_next.store(0, Ordering::Release);
    }

    pub fn assignment_of(&self, booking_id: BookingId) -> Option<DriverId> {
        self.assignments.lock().get(&booking_id).copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write attempts seen, successful or not
    pub fn write_attempts(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AssignmentRecorder for MemoryLedger {
    async fn record_assignment(
        &self,
        booking_id: BookingId,
        driver_id: DriverId,
    ) -> Result<(), PersistenceError> {
        self.writes.fetch_add(1, Ordering::AcqRel);

        if self.take_injected_failure() || self.failing_drivers.lock().contains(&driver_id) {
            return Err(PersistenceError::WriteFailed(format!(
                "injected failure for booking {} / driver {}",
                booking_id, driver_id
            )));
        }

        let mut assignments = self.assignments.lock();
        match assignments.get(&booking_id) {
            Some(existing) => Err(PersistenceError::AlreadyAssigned {
                booking_id,
                driver_id: *existing,
            }),
            None => {
                assignments.insert(booking_id, driver_id);
                Ok(())
            },
        }
    }

    async fn assigned_driver(&self, booking_id: BookingId) -> Result<Option<DriverId>, PersistenceError> {
        Ok(self.assignment_of(booking_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_on_booking_id() {
        let ledger = MemoryLedger::new();
        let booking = BookingId::new(1);
        ledger
            .record_assignment(booking, DriverId::new(7))
            .await
            .unwrap();
        assert_eq!(
            ledger.record_assignment(booking, DriverId::new(8)).await,
            Err(PersistenceError::AlreadyAssigned {
                booking_id: booking,
                driver_id: DriverId::new(7),
            })
        );
        assert_eq!(ledger.assignment_of(booking), Some(DriverId::new(7)));
        assert_eq!(ledger.assigned_driver(booking).await, Ok(Some(DriverId::new(7))));
        assert_eq!(ledger.assigned_driver(BookingId::new(2)).await, Ok(None));
        assert_eq!(ledger.write_attempts(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let ledger = MemoryLedger::new();
        ledger.fail_next_writes(1);
        assert!(ledger
            .record_assignment(BookingId::new(1), DriverId::new(1))
            .await
            .is_err());
        assert!(ledger
            .record_assignment(BookingId::new(1), DriverId::new(1))
            .await
            .is_ok());

        ledger.fail_for_driver(DriverId::new(2));
        assert!(ledger
            .record_assignment(BookingId::new(2), DriverId::new(2))
            .await
            .is_err());
        assert!(ledger.assignment_of(BookingId::new(2)).is_none());
    }
}
