// ============================================================================
// Dispatch Engine Library
// Ride-hailing driver dispatch: location index, advisory locks, matching,
// driver notification and queue ingestion
// ============================================================================

//! # Dispatch Engine
//!
//! Matches ride bookings to nearby drivers and pushes the assignment to the
//! chosen driver over a live connection.
//!
//! ## Features
//!
//! - **Cell-based location index** over H3 cells with TTL-expiring entries
//! - **Advisory per-driver locks** via atomic set-if-absent with expiry
//! - **First-available-wins matching**: lock, record, notify, release on failure
//! - **Actor-owned connection registry** with heartbeat and bounded queues
//! - **At-least-once ingestion** with bounded retry and health metrics
//!
//! Storage, queue and persistence are traits; the [`memory`] module ships
//! in-process implementations.
//!
//! ## Example
//!
//! ```rust
//! use dispatch_engine::prelude::*;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = NotificationHub::spawn(HubConfig::default()).unwrap();
//! let dispatcher = DispatcherBuilder::new()
//!     .build(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryLedger::new()),
//!         Arc::new(hub.clone()),
//!     )
//!     .unwrap();
//!
//! let pickup = Location::new(12.9716, 77.5946);
//! dispatcher.index().update(DriverId::new(19), pickup).await.unwrap();
//!
//! let booking = BookingRequest::new(
//!     BookingId::new(1),
//!     UserId::new(42),
//!     pickup,
//!     Location::new(12.9352, 77.6245),
//!     Decimal::new(2455, 1),
//! );
//!
//! let outcome = dispatcher.dispatch(&booking).await.unwrap();
//! assert_eq!(outcome.status, AssignmentStatus::DriverAssigned);
//! assert_eq!(outcome.driver_id, Some(DriverId::new(19)));
//!
//! // Driver 19 had no live connection, so the notice was recorded as a miss
//! assert_eq!(hub.stats().missed, 1);
//! # }
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod interfaces;
pub mod memory;
pub mod notify;
pub mod utils;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::{
        AssignmentNotice, AssignmentOutcome, AssignmentStatus, BookingId, BookingRequest,
        ConnectionId, DispatchConfig, DriverCandidate, DriverId, DriverLocationEntry, GeoCell,
        HubConfig, IndexConfig, Location, LockConfig, PipelineConfig, RetryPolicy, UserId,
    };
    pub use crate::engine::{
        create_from_config, AssignmentLock, Dispatcher, DispatcherBuilder, DriverLocationIndex,
        IndexOrder, NearestFirst,
    };
    pub use crate::error::{
        DispatchError, DispatchResult, PersistenceError, QueueError, StoreError, TransportError,
    };
    pub use crate::ingest::{HealthReport, HealthSnapshot, IngestionPipeline, PipelineHealth};
    pub use crate::interfaces::{
        AssignmentRecorder, BookingQueue, CandidatePolicy, DispatchEvent, DriverNotifier,
        EventHandler, KeyValueStore, LoggingEventHandler, NoOpEventHandler, QueueMessage,
        SendOutcome,
    };
    pub use crate::memory::{MemoryLedger, MemoryQueue, MemoryStore};
    pub use crate::notify::{Frame, HubHandle, HubStats, NotificationHub, SessionHandle};
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use futures::channel::mpsc;
    use futures::{SinkExt, StreamExt};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const PICKUP: Location = Location::new(12.9716, 77.5946);

    fn booking(id: u64) -> BookingRequest {
        BookingRequest::new(
            BookingId::new(id),
            UserId::new(7),
            PICKUP,
            Location::new(12.9352, 77.6245),
            Decimal::new(2455, 1),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_queue_to_driver_socket() {
        let mut config = DispatchConfig::fast_feedback();
        config.hub = HubConfig::default();
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let hub = NotificationHub::spawn(config.hub.clone()).unwrap();

        let dispatcher = Arc::new(
            create_from_config(
                &config,
                store.clone(),
                ledger.clone(),
                Arc::new(hub.clone()),
                Arc::new(LoggingEventHandler),
            )
            .unwrap(),
        );

        // Three drivers in the pickup cell, two of them busy elsewhere
        for id in [7, 12, 19] {
            dispatcher.index().update(DriverId::new(id), PICKUP).await.unwrap();
        }
        dispatcher.lock().try_acquire(DriverId::new(7)).await;
        dispatcher.lock().try_acquire(DriverId::new(12)).await;

        // Driver 19 holds a live connection
        let (server_sink, mut driver_rx) = mpsc::channel::<Frame>(16);
        let (mut driver_tx, server_stream) = mpsc::channel::<Result<Frame, String>>(16);
        let session = hub
            .connect(DriverId::new(19), server_sink, server_stream)
            .await
            .unwrap();

        let queue = MemoryQueue::new(Duration::from_secs(30));
        queue.publish_json(&booking(1)).unwrap();

        let mut pipeline = IngestionPipeline::new(
            Box::new(queue.consumer()),
            Arc::clone(&dispatcher),
            config.pipeline.clone(),
        );
        let health = pipeline.health();
        let cancel = CancellationToken::new();
        let running = {
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(cancel).await })
        };

        let frame = loop {
            match driver_rx.next().await {
                Some(Frame::Ping(_)) => continue,
                other => break other,
            }
        };
        let Some(Frame::Text(payload)) = frame else {
            panic!("expected assignment notice, got {:?}", frame);
        };
        let notice: AssignmentNotice = serde_json::from_str(&payload).unwrap();
        assert_eq!(notice.booking_id, BookingId::new(1));
        assert_eq!(notice.status, AssignmentStatus::DriverAssigned);
        assert_eq!(ledger.assignment_of(BookingId::new(1)), Some(DriverId::new(19)));

        while health.messages_processed() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        running.await.unwrap();
        assert!(health.is_healthy());
        assert_eq!(queue.committed_offset(), 1);

        driver_tx.send(Ok(Frame::Close)).await.unwrap();
        assert_eq!(session.join().await, Some(TransportError::Closed));
        assert_eq!(hub.stats().live_connections, 0);
        assert_eq!(hub.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_redelivered_booking_is_not_reassigned() {
        let config = DispatchConfig::fast_feedback();
        let ledger = Arc::new(MemoryLedger::new());
        let hub = NotificationHub::spawn(config.hub.clone()).unwrap();
        let dispatcher = Arc::new(
            DispatcherBuilder::from_config(config.clone())
                .build(Arc::new(MemoryStore::new()), ledger.clone(), Arc::new(hub.clone()))
                .unwrap(),
        );
        for id in [1, 2] {
            dispatcher.index().update(DriverId::new(id), PICKUP).await.unwrap();
        }

        // Same payload delivered twice, as after a consumer crash before commit
        let queue = MemoryQueue::new(Duration::from_secs(30));
        queue.publish_json(&booking(5)).unwrap();
        queue.publish_json(&booking(5)).unwrap();

        let mut pipeline = IngestionPipeline::new(
            Box::new(queue.consumer()),
            Arc::clone(&dispatcher),
            config.pipeline.clone(),
        );
        let health = pipeline.health();
        let cancel = CancellationToken::new();
        let running = {
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(cancel).await })
        };
        while health.messages_processed() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        running.await.unwrap();

        assert_eq!(ledger.len(), 1);
        // Only the first delivery produced a notice attempt
        assert_eq!(hub.stats().missed, 1);
    }

    #[tokio::test]
    async fn test_store_outage_is_not_no_drivers() {
        let store = Arc::new(MemoryStore::new());
        let hub = NotificationHub::spawn(HubConfig::default()).unwrap();
        let dispatcher = DispatcherBuilder::new()
            .build(store.clone(), Arc::new(MemoryLedger::new()), Arc::new(hub))
            .unwrap();
        dispatcher.index().update(DriverId::new(1), PICKUP).await.unwrap();

        store.set_available(false);
        assert!(matches!(
            dispatcher.dispatch(&booking(1)).await,
            Err(DispatchError::StoreUnavailable(_))
        ));

        store.set_available(true);
        assert!(dispatcher.dispatch(&booking(1)).await.unwrap().is_assigned());
    }
}
