// ============================================================================
// In-Memory Adapters
// Process-local implementations of the store, queue and recorder contracts
// ============================================================================
//
// Used by tests, demos and single-node deployments. Production deployments
// plug a shared store and a durable queue in behind the same traits.

mod ledger;
mod queue;
mod store;

pub use ledger::MemoryLedger;
pub use queue::{MemoryConsumer, MemoryQueue};
pub use store::MemoryStore;
