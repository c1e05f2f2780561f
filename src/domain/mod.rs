// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod booking;
pub mod config;
pub mod driver;
pub mod ids;
pub mod location;

pub use booking::{AssignmentNotice, AssignmentOutcome, AssignmentStatus, BookingRequest};
pub use config::{DispatchConfig, HubConfig, IndexConfig, LockConfig, PipelineConfig, RetryPolicy};
pub use driver::{DriverCandidate, DriverLocationEntry};
pub use ids::{BookingId, ConnectionId, DriverId, UserId};
pub use location::{GeoCell, Location};
