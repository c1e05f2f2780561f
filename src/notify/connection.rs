// ============================================================================
// Driver Connection
// Per-connection state machine and outbound queue
// ============================================================================

use crate::domain::{ConnectionId, DriverId};
use crate::notify::outbound::{OutboundQueue, PushOutcome};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// ============================================================================
// Connection State Machine
// ============================================================================

pub mod state {
    /// `Connecting -> Registered -> (Delivering <-> Registered)* -> Unregistered`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(u8)]
    pub enum ConnectionState {
        Connecting = 0,
        Registered = 1,
        Delivering = 2,
        Unregistered = 3,
    }

    impl ConnectionState {
        pub fn from_u8(val: u8) -> Self {
            match val {
                0 => ConnectionState::Connecting,
                1 => ConnectionState::Registered,
                2 => ConnectionState::Delivering,
                _ => ConnectionState::Unregistered,
            }
        }

        pub fn is_terminal(&self) -> bool {
            matches!(self, ConnectionState::Unregistered)
        }

        pub fn is_live(&self) -> bool {
            matches!(self, ConnectionState::Registered | ConnectionState::Delivering)
        }
    }
}

use state::ConnectionState;

/// A driver's live connection as seen by the hub.
///
/// The hub owns the registry entry; the session's writer loop shares the
/// outbound queue. Dropping the registry entry does not close the socket,
/// closing the queue does.
#[derive(Debug)]
pub struct DriverConnection {
    id: ConnectionId,
    driver_id: DriverId,
    outbound: Arc<OutboundQueue>,
    state: AtomicU8,
}

impl DriverConnection {
    pub fn new(driver_id: DriverId, outbound_capacity: usize) -> Self {
        Self {
            id: ConnectionId::new(),
            driver_id,
            outbound: Arc::new(OutboundQueue::new(outbound_capacity)),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn driver_id(&self) -> DriverId {
        self.driver_id
    }

    pub fn outbound(&self) -> &Arc<OutboundQueue> {
        &self.outbound
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Atomically move `from -> to`; false if the current state differs
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Installed in the registry
    pub fn mark_registered(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Registered)
    }

    /// Writer picked up a message
    pub fn begin_delivery(&self) -> bool {
        self.transition(ConnectionState::Registered, ConnectionState::Delivering)
    }

    /// Writer finished a message
    pub fn end_delivery(&self) -> bool {
        self.transition(ConnectionState::Delivering, ConnectionState::Registered)
    }

    /// Terminal: closes the outbound queue so the writer exits. Idempotent.
    pub fn close(&self) {
        self.state
            .store(ConnectionState::Unregistered as u8, Ordering::Release);
        self.outbound.close();
    }

    pub fn enqueue(&self, message: String) -> PushOutcome {
        if self.state().is_terminal() {
            return PushOutcome::Closed;
        }
        self.outbound.push(message)
    }
}
