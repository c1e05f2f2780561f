// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod candidate_policy;
mod event_handler;
mod notifier;
mod queue;
mod recorder;
mod store;

pub use candidate_policy::CandidatePolicy;
pub use event_handler::{DispatchEvent, EventHandler, LoggingEventHandler, NoOpEventHandler};
pub use notifier::{DriverNotifier, SendOutcome};
pub use queue::{BookingQueue, QueueMessage};
pub use recorder::AssignmentRecorder;
pub use store::{keys, KeyValueStore};
