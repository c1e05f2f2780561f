// ============================================================================
// Ingestion Module
// Asynchronous booking intake from the durable request queue
// ============================================================================

mod health;
mod pipeline;
mod retry;

pub use health::{HealthReport, HealthSnapshot, PipelineHealth};
pub use pipeline::IngestionPipeline;
pub use retry::{retry_with_backoff, RetryOutcome};
