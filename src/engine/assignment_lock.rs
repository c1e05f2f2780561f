// ============================================================================
// Assignment Lock
// Advisory per-driver mutual exclusion over assignment attempts
// ============================================================================

use crate::domain::{DriverId, LockConfig};
use crate::interfaces::{keys, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const LOCK_VALUE: &str = "locked";

/// At most one holder per driver at any instant.
///
/// Acquisition is a single atomic set-if-absent with expiry in the shared
/// store; the TTL bounds how long a crashed holder can block a driver.
/// Store errors never count as acquired.
pub struct AssignmentLock {
    store: Arc<dyn KeyValueStore>,
    default_ttl: Duration,
}

impl AssignmentLock {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &LockConfig) -> Self {
        Self {
            store,
            default_ttl: config.ttl,
        }
    }

    /// `true` iff this call created the lock. Already held (by anyone,
    /// including an earlier un-released call from the same caller) or store
    /// failure both return `false`.
    pub async fn acquire(&self, driver_id: DriverId, ttl: Duration) -> bool {
        match self
            .store
            .set_if_absent(&keys::driver_lock(driver_id), LOCK_VALUE.to_string(), ttl)
            .await
        {
            Ok(acquired) => {
                if !acquired {
                    debug!(driver_id = %driver_id, "Driver lock already held");
                }
                acquired
            },
            Err(e) => {
                warn!(driver_id = %driver_id, error = %e, "Failed to acquire driver lock");
                false
            },
        }
    }

    /// Acquire with the configured TTL
    pub async fn try_acquire(&self, driver_id: DriverId) -> bool {
        self.acquire(driver_id, self.default_ttl).await
    }

    /// Unconditional delete; releasing an unheld lock is fine. A store error
    /// is logged and the TTL cleans up.
    pub async fn release(&self, driver_id: DriverId) {
        if let Err(e) = self.store.delete(&keys::driver_lock(driver_id)).await {
            warn!(driver_id = %driver_id, error = %e, "Failed to release driver lock");
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn lock_with_store() -> (Arc<AssignmentLock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let lock = AssignmentLock::new(store.clone(), &LockConfig::default());
        (Arc::new(lock), store)
    }

    #[tokio::test]
    async fn test_acquire_is_not_reentrant() {
        let (lock, _) = lock_with_store();
        let driver = DriverId::new(7);
        assert!(lock.try_acquire(driver).await);
        assert!(!lock.try_acquire(driver).await);
        assert!(lock.try_acquire(DriverId::new(8)).await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (lock, _) = lock_with_store();
        let driver = DriverId::new(7);
        lock.release(driver).await;
        assert!(lock.try_acquire(driver).await);
        lock.release(driver).await;
        lock.release(driver).await;
        assert!(lock.try_acquire(driver).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_frees_crashed_holder() {
        let (lock, _) = lock_with_store();
        let driver = DriverId::new(7);
        assert!(lock.acquire(driver, Duration::from_secs(60)).await);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!lock.try_acquire(driver).await);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(lock.try_acquire(driver).await);
    }

    #[tokio::test]
    async fn test_store_error_fails_closed() {
        let (lock, store) = lock_with_store();
        store.set_available(false);
        assert!(!lock.try_acquire(DriverId::new(7)).await);
        lock.release(DriverId::new(7)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_acquire_single_winner() {
        let (lock, _) = lock_with_store();
        let driver = DriverId::new(42);
        let (a, b) = tokio::join!(
            {
                let lock = Arc::clone(&lock);
                tokio::spawn(async move { lock.try_acquire(driver).await })
            },
            {
                let lock = Arc::clone(&lock);
                tokio::spawn(async move { lock.try_acquire(driver).await })
            }
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|won| **won).count(), 1);
    }
}
