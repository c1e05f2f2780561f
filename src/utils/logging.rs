// ============================================================================
// Logging Setup
// ============================================================================

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (e.g. `"info"` or
/// `"dispatch_engine=debug"`) applies. Returns an error if a global
/// subscriber is already installed.
pub fn init_logging(default_filter: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| format!("Invalid log filter: {}", e))?;

    Registry::default()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| format!("Logging already initialised: {}", e))
}
