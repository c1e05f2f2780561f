// ============================================================================
// Basic Dispatch Example
// ============================================================================
//
// Run with: cargo run --example basic_dispatch --features logging

use dispatch_engine::prelude::*;
use dispatch_engine::utils::init_logging;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info,dispatch_engine=debug")?;

    println!("=== Dispatch Engine Example ===\n");

    let config = DispatchConfig::fast_feedback();
    let hub = NotificationHub::spawn(config.hub.clone())?;
    let ledger = Arc::new(MemoryLedger::new());

    let dispatcher = Arc::new(
        DispatcherBuilder::from_config(config.clone())
            .nearest_first()
            .with_event_handler(Arc::new(LoggingEventHandler))
            .build(Arc::new(MemoryStore::new()), ledger.clone(), Arc::new(hub.clone()))?,
    );

    // Drivers report their positions around MG Road, Bengaluru
    let pickup = Location::new(12.9756, 77.6050);
    let positions = [
        (7, Location::new(12.97562, 77.60504)),
        (12, Location::new(12.97558, 77.60497)),
        (19, Location::new(12.97571, 77.60511)),
    ];
    for (id, location) in positions {
        let cell = dispatcher.index().update(DriverId::new(id), location).await?;
        println!("Driver {:>2} at ({:.5}, {:.5}) in cell {}", id, location.lat, location.lng, cell);
    }

    // Every driver holds a live connection and answers pings
    let mut driver_tasks = Vec::new();
    for (id, _) in positions {
        let (server_sink, mut inbox) = mpsc::channel::<Frame>(16);
        let (mut outbox, server_stream) = mpsc::channel::<Result<Frame, String>>(16);
        hub.connect(DriverId::new(id), server_sink, server_stream).await?;

        driver_tasks.push(tokio::spawn(async move {
            while let Some(frame) = inbox.next().await {
                match frame {
                    Frame::Text(payload) => println!("Driver {:>2} received: {}", id, payload),
                    Frame::Ping(data) => {
                        let _ = outbox.send(Ok(Frame::Pong(data))).await;
                    },
                    Frame::Close => break,
                    Frame::Pong(_) => {},
                }
            }
        }));
    }

    // Bookings arrive through the queue; one of them is garbage
    let queue = MemoryQueue::new(Duration::from_secs(30));
    for id in 1..=4 {
        let booking = BookingRequest::new(
            BookingId::new(id),
            UserId::new(100 + id as i64),
            pickup,
            Location::new(12.9352, 77.6245),
            Decimal::new(2000 + id as i64 * 150, 1),
        );
        queue.publish_json(&booking)?;
    }
    queue.publish("{\"booking_id\": \"oops\"}");

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

    // Booking 4 finds every driver taken and exhausts its retries
    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    running.await?;

    println!("\n=== Assignments ===");
    for id in 1..=4 {
        match ledger.assignment_of(BookingId::new(id)) {
            Some(driver) => println!("  Booking {} -> driver {}", id, driver),
            None => println!("  Booking {} -> NO_DRIVERS_AVAILABLE", id),
        }
    }

    println!("\n=== Pipeline Health ===");
    println!("{}", serde_json::to_string_pretty(&health.report())?);

    println!("\n=== Hub Stats ===");
    println!("{}", serde_json::to_string_pretty(&hub.stats())?);

    hub.shutdown().await;
    for task in driver_tasks {
        let _ = task.await;
    }

    Ok(())
}
