// ============================================================================
// In-Memory Key-Value Store
// Process-local implementation of the backing store contract
// ============================================================================

use crate::error::StoreError;
use crate::interfaces::KeyValueStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
enum Value {
    Plain(String),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// TTL-aware store with plain values and sets.
///
/// Expiry is lazy: an expired key is dropped the next time it is touched.
/// Time comes from `tokio::time`, so paused-clock tests can step over TTLs.
/// All operations take one mutex, which makes `set_if_absent` and
/// `add_to_set` atomic.
#[derive(Debug)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
    available: AtomicBool,
    set_if_absent_calls: AtomicU64,
    delete_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            set_if_absent_calls: AtomicU64::new(0),
            delete_calls: AtomicU64::new(0),
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable` until
    /// switched back on
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Number of `set_if_absent` calls seen (lock acquisitions)
    pub fn set_if_absent_calls(&self) -> u64 {
        self.set_if_absent_calls.load(Ordering::Acquire)
    }

    /// Number of `delete` calls seen (lock releases)
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::Acquire)
    }

    /// Remaining time to live of a key, `None` if absent or persistent
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let slots = self.slots.lock();
        slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.lock().values().filter(|s| s.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }

    /// Drop `key` if it has expired, then return the live slot
    fn live_slot<'a>(
        slots: &'a mut HashMap<String, Slot>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Slot> {
        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
        }
        slots.get_mut(key)
    }

    fn corrupt(key: &str, reason: &str) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check_available()?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.slots.lock().insert(
            key.to_string(),
            Slot {
                value: Value::Plain(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.set_if_absent_calls.fetch_add(1, Ordering::AcqRel);
        self.check_available()?;
        let now = Instant::now();
        let mut slots = self.slots.lock();
        if Self::live_slot(&mut slots, key, now).is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: Value::Plain(value),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let mut slots = self.slots.lock();
        match Self::live_slot(&mut slots, key, Instant::now()) {
            None => Ok(None),
            Some(Slot {
                value: Value::Plain(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(Self::corrupt(key, "expected a plain value, found a set")),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.delete_calls.fetch_add(1, Ordering::AcqRel);
        self.check_available()?;
        let mut slots = self.slots.lock();
        let live = Self::live_slot(&mut slots, key, Instant::now()).is_some();
        slots.remove(key);
        Ok(live)
    }

    async fn add_to_set(&self, key: &str, member: String, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let mut slots = self.slots.lock();
        match Self::live_slot(&mut slots, key, now) {
            Some(slot) => match &mut slot.value {
                Value::Set(members) => {
                    members.insert(member);
                    slot.expires_at = Some(now + ttl);
                },
                Value::Plain(_) => return Err(Self::corrupt(key, "expected a set")),
            },
            None => {
                slots.insert(
                    key.to_string(),
                    Slot {
                        value: Value::Set(HashSet::from([member])),
                        expires_at: Some(now + ttl),
                    },
                );
            },
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let mut slots = self.slots.lock();
        match Self::live_slot(&mut slots, key, Instant::now()) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(Self::corrupt(key, "expected a set, found a plain value")),
        }
    }
}
