// ============================================================================
// Notification Hub
// Single-owner registry of driver connections, driven by commands
// ============================================================================

use crate::domain::{AssignmentNotice, ConnectionId, DriverId, HubConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::interfaces::{DriverNotifier, SendOutcome};
use crate::notify::connection::DriverConnection;
use crate::notify::outbound::PushOutcome;
use crate::notify::session::{self, SessionHandle};
use crate::notify::Frame;
use async_trait::async_trait;
use futures::{Sink, Stream};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

// ============================================================================
// Commands
// ============================================================================

enum Command {
    Register {
        connection: Arc<DriverConnection>,
        done: oneshot::Sender<()>,
    },
    Unregister {
        driver_id: DriverId,
        /// Only remove the entry if it is still this connection
        connection_id: Option<ConnectionId>,
        done: oneshot::Sender<bool>,
    },
    Send {
        driver_id: DriverId,
        message: String,
        reply: oneshot::Sender<SendOutcome>,
    },
    Shutdown,
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct HubCounters {
    delivered: AtomicU64,
    missed: AtomicU64,
    dropped: AtomicU64,
    registered: AtomicU64,
    unregistered: AtomicU64,
    live: AtomicUsize,
}

/// Point-in-time hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Messages accepted onto a connection queue
    pub delivered: u64,
    /// Sends addressed to a driver with no live connection
    pub missed: u64,
    /// Queued messages discarded because a client fell behind
    pub dropped: u64,
    pub registered: u64,
    pub unregistered: u64,
    pub live_connections: usize,
}

impl HubCounters {
    fn snapshot(&self) -> HubStats {
        HubStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            live_connections: self.live.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Registry Task
// ============================================================================

/// Owns the `DriverId -> DriverConnection` map. Every mutation arrives as a
/// command on one channel, so register/unregister/send are linearized.
pub struct NotificationHub {
    connections: HashMap<DriverId, Arc<DriverConnection>>,
    counters: Arc<HubCounters>,
    commands: mpsc::Receiver<Command>,
}

impl NotificationHub {
    /// Start the registry task on the current runtime. Rejects a config the
    /// connection tasks cannot run with.
    pub fn spawn(config: HubConfig) -> DispatchResult<HubHandle> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        let (tx, rx) = mpsc::channel(config.command_buffer);
        let counters = Arc::new(HubCounters::default());

        let hub = NotificationHub {
            connections: HashMap::new(),
            counters: Arc::clone(&counters),
            commands: rx,
        };
        tokio::spawn(hub.run());

        Ok(HubHandle {
            commands: tx,
            counters,
            config: Arc::new(config),
        })
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register { connection, done } => {
                    self.register(connection);
                    let _ = done.send(());
                },
                Command::Unregister {
                    driver_id,
                    connection_id,
                    done,
                } => {
                    let removed = self.unregister(driver_id, connection_id);
                    let _ = done.send(removed);
                },
                Command::Send {
                    driver_id,
                    message,
                    reply,
                } => {
                    let _ = reply.send(self.send(driver_id, message));
                },
                Command::Shutdown => break,
            }
        }

        for (_, connection) in self.connections.drain() {
            connection.close();
        }
        self.counters.live.store(0, Ordering::Relaxed);
        info!("Notification hub stopped");
    }

    fn register(&mut self, connection: Arc<DriverConnection>) {
        let driver_id = connection.driver_id();
        connection.mark_registered();

        // The replaced connection closes itself when its socket fails
        if let Some(previous) = self.connections.insert(driver_id, Arc::clone(&connection)) {
            info!(driver_id = %driver_id, previous = %previous.id(), "Replacing driver connection");
        } else {
            info!(driver_id = %driver_id, connection = %connection.id(), "Driver connected");
        }

        self.counters.registered.fetch_add(1, Ordering::Relaxed);
        self.counters
            .live
            .store(self.connections.len(), Ordering::Relaxed);
    }

    fn unregister(&mut self, driver_id: DriverId, connection_id: Option<ConnectionId>) -> bool {
        let current = match self.connections.get(&driver_id) {
            Some(connection) => connection,
            None => return false,
        };

        if connection_id.is_some_and(|id| id != current.id()) {
            debug!(driver_id = %driver_id, "Stale unregister ignored");
            return false;
        }

        if let Some(connection) = self.connections.remove(&driver_id) {
            connection.close();
            info!(driver_id = %driver_id, connection = %connection.id(), "Driver disconnected");
        }

        self.counters.unregistered.fetch_add(1, Ordering::Relaxed);
        self.counters
            .live
            .store(self.connections.len(), Ordering::Relaxed);
        true
    }

    fn send(&mut self, driver_id: DriverId, message: String) -> SendOutcome {
        let Some(connection) = self.connections.get(&driver_id) else {
            self.counters.missed.fetch_add(1, Ordering::Relaxed);
            warn!(driver_id = %driver_id, "No connection for driver, message not delivered");
            return SendOutcome::NotConnected;
        };

        match connection.enqueue(message) {
            PushOutcome::Enqueued => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Enqueued
            },
            PushOutcome::DroppedOldest(_) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(driver_id = %driver_id, "Outbound queue full, dropped oldest message");
                SendOutcome::EnqueuedDroppedOldest
            },
            PushOutcome::Closed => {
                self.counters.missed.fetch_add(1, Ordering::Relaxed);
                warn!(driver_id = %driver_id, "Connection closing, message not delivered");
                SendOutcome::NotConnected
            },
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable front door to the registry task
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    counters: Arc<HubCounters>,
    config: Arc<HubConfig>,
}

impl HubHandle {
    /// Install `connection`, replacing any previous one for the same driver.
    /// Resolves once the registry has applied it.
    pub async fn register(&self, connection: Arc<DriverConnection>) -> DispatchResult<()> {
        let (done, applied) = oneshot::channel();
        self.commands
            .send(Command::Register { connection, done })
            .await
            .map_err(|_| DispatchError::HubStopped)?;
        applied.await.map_err(|_| DispatchError::HubStopped)
    }

    /// Remove whatever connection the driver has and close its queue.
    /// Returns whether an entry was removed.
    pub async fn unregister(&self, driver_id: DriverId) -> bool {
        self.unregister_inner(driver_id, None).await
    }

    /// Remove the driver's entry only if it is still `connection_id`, so a
    /// dying connection cannot evict its replacement
    pub async fn unregister_connection(&self, driver_id: DriverId, connection_id: ConnectionId) -> bool {
        self.unregister_inner(driver_id, Some(connection_id)).await
    }

    async fn unregister_inner(&self, driver_id: DriverId, connection_id: Option<ConnectionId>) -> bool {
        let (done, removed) = oneshot::channel();
        let command = Command::Unregister {
            driver_id,
            connection_id,
            done,
        };
        if self.commands.send(command).await.is_err() {
            return false;
        }
        removed.await.unwrap_or(false)
    }

    /// Queue `message` for the driver. A driver without a live connection is
    /// reported as `NotConnected` and counted as a miss.
    pub async fn send(&self, driver_id: DriverId, message: String) -> SendOutcome {
        let (reply, outcome) = oneshot::channel();
        let command = Command::Send {
            driver_id,
            message,
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return SendOutcome::HubStopped;
        }
        outcome.await.unwrap_or(SendOutcome::HubStopped)
    }

    /// Register a new connection for `driver_id` over the given transport
    /// halves and start its reader and writer loops
    pub async fn connect<S, R, E>(&self, driver_id: DriverId, sink: S, stream: R) -> DispatchResult<SessionHandle>
    where
        S: Sink<Frame> + Unpin + Send + 'static,
        S::Error: Display,
        R: Stream<Item = Result<Frame, E>> + Unpin + Send + 'static,
        E: Display + Send,
    {
        let connection = Arc::new(DriverConnection::new(
            driver_id,
            self.config.outbound_capacity,
        ));
        self.register(Arc::clone(&connection)).await?;
        Ok(session::spawn(
            self.clone(),
            connection,
            sink,
            stream,
            Arc::clone(&self.config),
        ))
    }

    /// Stop the registry task and close every connection
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    pub fn stats(&self) -> HubStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}

#[async_trait]
impl DriverNotifier for HubHandle {
    async fn notify_assignment(&self, driver_id: DriverId, notice: AssignmentNotice) -> SendOutcome {
        match serde_json::to_string(&notice) {
            Ok(message) => self.send(driver_id, message).await,
            Err(e) => {
                warn!(driver_id = %driver_id, error = %e, "Failed to encode assignment notice");
                SendOutcome::EncodeFailed
            },
        }
    }
}
