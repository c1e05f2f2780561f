// ============================================================================
// Notification Module
// Delivers assignment notices to connected drivers
// ============================================================================
//
// One registry task owns every driver connection. Each connection runs a
// reader loop (liveness) and a writer loop (queue drain plus keepalive)
// over any framed transport.

pub mod connection;
mod frame;
mod hub;
pub mod outbound;
mod session;

pub use connection::{state::ConnectionState, DriverConnection};
pub use frame::Frame;
pub use hub::{HubHandle, HubStats, NotificationHub};
pub use outbound::{OutboundQueue, PushOutcome};
pub use session::SessionHandle;
