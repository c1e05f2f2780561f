// ============================================================================
// Dispatcher
// First-available-wins matching under advisory per-driver locks
// ============================================================================

use crate::domain::{AssignmentNotice, AssignmentOutcome, BookingId, BookingRequest, DriverId};
use crate::engine::{AssignmentLock, DriverLocationIndex};
use crate::error::{DispatchResult, PersistenceError};
use crate::interfaces::{
    AssignmentRecorder, CandidatePolicy, DispatchEvent, DriverNotifier, EventHandler,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Matches a booking to one nearby driver.
///
/// Per candidate the steps are strictly ordered: lock, record, notify. A
/// failed record releases that candidate's lock before moving on, so a driver
/// is never left held by an attempt that did not assign it. A successful
/// assignment keeps its lock until the TTL expires.
///
/// # Example
/// ```text
/// Cell:   drivers [7, 12, 19]
/// Locks:  7 and 12 already held
///
/// dispatch(B1) -> DRIVER_ASSIGNED, driver 19
/// ```
pub struct Dispatcher {
    index: Arc<DriverLocationIndex>,
    lock: Arc<AssignmentLock>,
    recorder: Arc<dyn AssignmentRecorder>,
    notifier: Arc<dyn DriverNotifier>,
    policy: Box<dyn CandidatePolicy>,
    event_handler: Arc<dyn EventHandler>,
}

impl Dispatcher {
    pub fn new(
        index: Arc<DriverLocationIndex>,
        lock: Arc<AssignmentLock>,
        recorder: Arc<dyn AssignmentRecorder>,
        notifier: Arc<dyn DriverNotifier>,
        policy: Box<dyn CandidatePolicy>,
        event_handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            index,
            lock,
            recorder,
            notifier,
            policy,
            event_handler,
        }
    }

    /// Run one match attempt for `request`.
    ///
    /// Burns the candidate set once. Finding nobody is an `Ok` outcome with
    /// status `NO_DRIVERS_AVAILABLE`; only a failed index lookup is an error,
    /// and it is never read as "no drivers".
    pub async fn dispatch(&self, request: &BookingRequest) -> DispatchResult<AssignmentOutcome> {
        let booking_id = request.booking_id;
        let mut events = vec![DispatchEvent::BookingReceived {
            booking_id,
            timestamp: Utc::now(),
        }];

        // Redelivered request: answer from the record before touching any lock
        match self.recorder.assigned_driver(booking_id).await {
            Ok(Some(existing)) => return Ok(self.already_assigned(booking_id, existing, events)),
            Ok(None) => {},
            Err(e) => {
                warn!(booking_id = %booking_id, error = %e, "Assignment lookup failed, relying on write uniqueness");
            },
        }

        let mut candidates = match self.index.query(&request.pickup_location).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(booking_id = %booking_id, error = %e, "Location index unavailable");
                self.event_handler.on_events(events);
                return Err(e.into());
            },
        };

        events.push(DispatchEvent::CandidatesFound {
            booking_id,
            count: candidates.len(),
            timestamp: Utc::now(),
        });

        self.policy
            .order_candidates(&request.pickup_location, &mut candidates);

        for candidate in candidates.iter() {
            let driver_id = candidate.driver_id;

            if !self.lock.try_acquire(driver_id).await {
                debug!(booking_id = %booking_id, driver_id = %driver_id, "Candidate locked, skipping");
                events.push(DispatchEvent::LockContended {
                    booking_id,
                    driver_id,
                    timestamp: Utc::now(),
                });
                continue;
            }

            match self.recorder.record_assignment(booking_id, driver_id).await {
                Ok(()) => {
                    self.notify(driver_id, request).await;
                    info!(booking_id = %booking_id, driver_id = %driver_id, policy = self.policy.name(), "Driver assigned");
                    events.push(DispatchEvent::DriverAssigned {
                        booking_id,
                        driver_id,
                        timestamp: Utc::now(),
                    });
                    self.event_handler.on_events(events);
                    return Ok(AssignmentOutcome::assigned(booking_id, driver_id));
                },
                Err(PersistenceError::AlreadyAssigned {
                    driver_id: existing,
                    ..
                }) => {
                    // Lost a race with a concurrent copy of the same booking
                    self.lock.release(driver_id).await;
                    return Ok(self.already_assigned(booking_id, existing, events));
                },
                Err(e) => {
                    self.lock.release(driver_id).await;
                    warn!(booking_id = %booking_id, driver_id = %driver_id, error = %e, "Assignment write failed, lock released");
                    events.push(DispatchEvent::AssignmentWriteFailed {
                        booking_id,
                        driver_id,
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                },
            }
        }

        debug!(booking_id = %booking_id, candidates = candidates.len(), "No assignable driver");
        events.push(DispatchEvent::NoDriversAvailable {
            booking_id,
            timestamp: Utc::now(),
        });
        self.event_handler.on_events(events);
        Ok(AssignmentOutcome::no_drivers(booking_id))
    }

    /// The booking already has its driver; the driver is not notified again
    fn already_assigned(
        &self,
        booking_id: BookingId,
        existing: DriverId,
        mut events: Vec<DispatchEvent>,
    ) -> AssignmentOutcome {
        info!(booking_id = %booking_id, driver_id = %existing, "Booking already assigned");
        events.push(DispatchEvent::DuplicateBooking {
            booking_id,
            driver_id: existing,
            timestamp: Utc::now(),
        });
        self.event_handler.on_events(events);
        AssignmentOutcome::assigned(booking_id, existing)
    }

    /// Hand the notice to the hub. Misses are logged; the assignment stands.
    async fn notify(&self, driver_id: DriverId, request: &BookingRequest) {
        let outcome = self
            .notifier
            .notify_assignment(driver_id, AssignmentNotice::from(request))
            .await;
        if !outcome.is_enqueued() {
            warn!(booking_id = %request.booking_id, driver_id = %driver_id, outcome = ?outcome, "Assignment notice not delivered");
        }
    }

    pub fn index(&self) -> &Arc<DriverLocationIndex> {
        &self.index
    }

    pub fn lock(&self) -> &Arc<AssignmentLock> {
        &self.lock
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }
}
