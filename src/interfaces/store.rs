// ============================================================================
// Key-Value Store Interface
// Contract required of the shared backing store (locations, cells, locks)
// ============================================================================

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Shared backing store. Every operation is a network round trip in
/// production; callers block on it while other tasks proceed.
///
/// Implementations must make `set_if_absent` and `add_to_set` atomic: the
/// assignment lock and the cell membership index rely on it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Overwrite `key`. `ttl = None` keeps the value until deleted.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomic set-if-not-exists with expiry. Returns `true` iff this call
    /// created the key.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration)
        -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Returns whether a key was removed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomic add-to-set; the set key's expiry is reset to `ttl`
    async fn add_to_set(&self, key: &str, member: String, ttl: Duration)
        -> Result<(), StoreError>;

    /// All members of the set under `key`; empty when the key is absent
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}

/// Key layout shared with the location producers
pub mod keys {
    use crate::domain::{DriverId, GeoCell};

    pub fn driver_location(driver_id: DriverId) -> String {
        format!("driver_location:{}", driver_id)
    }

    pub fn drivers_in_cell(cell: GeoCell) -> String {
        format!("drivers_in_cell:{}", cell)
    }

    pub fn driver_lock(driver_id: DriverId) -> String {
        format!("driver_lock:{}", driver_id)
    }
}
