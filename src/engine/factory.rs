// ============================================================================
// Dispatcher Factory
// Wires the index, lock, recorder and notifier into a dispatcher
// ============================================================================

use crate::domain::DispatchConfig;
use crate::engine::{AssignmentLock, Dispatcher, DriverLocationIndex, IndexOrder, NearestFirst};
use crate::error::{DispatchError, DispatchResult};
use crate::interfaces::{
    AssignmentRecorder, CandidatePolicy, DriverNotifier, EventHandler, KeyValueStore,
    NoOpEventHandler,
};
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates a dispatcher from configuration, using first-available ordering
///
/// # Arguments
/// * `config` - Dispatch configuration (validated here)
/// * `store` - Shared key-value store backing the index and the locks
/// * `recorder` - Durable assignment writer
/// * `notifier` - Driver-facing delivery, usually a `HubHandle`
/// * `event_handler` - Observer for dispatch events
///
/// # Example
/// ```
/// use dispatch_engine::prelude::*;
/// use dispatch_engine::engine::factory::create_from_config;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = DispatchConfig::default();
/// let hub = NotificationHub::spawn(config.hub.clone()).unwrap();
/// let dispatcher = create_from_config(
///     &config,
///     Arc::new(MemoryStore::new()),
///     Arc::new(MemoryLedger::new()),
///     Arc::new(hub),
///     Arc::new(NoOpEventHandler),
/// )
/// .unwrap();
/// assert_eq!(dispatcher.policy_name(), "IndexOrder");
/// # }
/// ```
pub fn create_from_config(
    config: &DispatchConfig,
    store: Arc<dyn KeyValueStore>,
    recorder: Arc<dyn AssignmentRecorder>,
    notifier: Arc<dyn DriverNotifier>,
    event_handler: Arc<dyn EventHandler>,
) -> DispatchResult<Dispatcher> {
    config.validate().map_err(DispatchError::InvalidConfig)?;

    let index = DriverLocationIndex::new(Arc::clone(&store), &config.index);
    let lock = AssignmentLock::new(store, &config.lock);

    Ok(Dispatcher::new(
        Arc::new(index),
        Arc::new(lock),
        recorder,
        notifier,
        Box::new(IndexOrder),
        event_handler,
    ))
}

// ============================================================================
// Builder Pattern for Advanced Configuration
// ============================================================================

/// Builder for creating dispatchers with fluent API
///
/// # Example
/// ```
/// use dispatch_engine::prelude::*;
/// use dispatch_engine::engine::factory::DispatcherBuilder;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let hub = NotificationHub::spawn(HubConfig::default()).unwrap();
/// let dispatcher = DispatcherBuilder::new()
///     .nearest_first()
///     .with_search_ring(1)
///     .with_lock_ttl(Duration::from_secs(30))
///     .build(
///         Arc::new(MemoryStore::new()),
///         Arc::new(MemoryLedger::new()),
///         Arc::new(hub),
///     )
///     .unwrap();
/// assert_eq!(dispatcher.policy_name(), "NearestFirst");
/// # }
/// ```
pub struct DispatcherBuilder {
    config: DispatchConfig,
    policy: Box<dyn CandidatePolicy>,
    event_handler: Arc<dyn EventHandler>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatchConfig::default(),
            policy: Box::new(IndexOrder),
            event_handler: Arc::new(NoOpEventHandler),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: DispatchConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    // ========================================================================
    // Candidate Ordering
    // ========================================================================

    /// Offer the booking in index order (default)
    pub fn index_order(mut self) -> Self {
        self.policy = Box::new(IndexOrder);
        self
    }

    /// Offer the booking to the closest candidate first
    pub fn nearest_first(mut self) -> Self {
        self.policy = Box::new(NearestFirst);
        self
    }

    pub fn with_policy(mut self, policy: Box<dyn CandidatePolicy>) -> Self {
        self.policy = policy;
        self
    }

    // ========================================================================
    // Index and Lock Tuning
    // ========================================================================

    pub fn with_search_ring(mut self, ring: u32) -> Self {
        self.config.index.search_ring = ring;
        self
    }

    pub fn with_location_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.config.index.location_ttl = ttl;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.config.lock.ttl = ttl;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn build(
        self,
        store: Arc<dyn KeyValueStore>,
        recorder: Arc<dyn AssignmentRecorder>,
        notifier: Arc<dyn DriverNotifier>,
    ) -> DispatchResult<Dispatcher> {
        self.config.validate().map_err(DispatchError::InvalidConfig)?;

        let index = DriverLocationIndex::new(Arc::clone(&store), &self.config.index);
        let lock = AssignmentLock::new(store, &self.config.lock);

        Ok(Dispatcher::new(
            Arc::new(index),
            Arc::new(lock),
            recorder,
            notifier,
            self.policy,
            self.event_handler,
        ))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
