// ============================================================================
// Engine Module
// Contains the core dispatch business logic
// ============================================================================

mod assignment_lock;
mod candidate_policy;
mod dispatcher;
mod location_index;

pub mod factory;

pub use assignment_lock::AssignmentLock;
pub use candidate_policy::{IndexOrder, NearestFirst};
pub use dispatcher::Dispatcher;
pub use factory::{create_from_config, DispatcherBuilder};
pub use location_index::{CandidateSet, DriverLocationIndex};
