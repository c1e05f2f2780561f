// ============================================================================
// Driver Location Index
// Last-known driver positions plus a cell -> drivers reverse index
// ============================================================================

use crate::domain::{DriverCandidate, DriverId, DriverLocationEntry, GeoCell, IndexConfig, Location};
use crate::error::StoreError;
use crate::interfaces::{keys, KeyValueStore};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Candidates found around a pickup point, in no particular order
pub type CandidateSet = SmallVec<[DriverCandidate; 8]>;

/// Expiring, derived cache of driver positions.
///
/// Cell membership is never retracted when a driver moves: the old cell's
/// set simply ages out. Lookups therefore resolve every member against its
/// location entry and drop members whose entry has expired, which keeps
/// stale membership invisible to callers.
pub struct DriverLocationIndex {
    store: Arc<dyn KeyValueStore>,
    location_ttl: Duration,
    search_ring: u32,
}

impl DriverLocationIndex {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &IndexConfig) -> Self {
        Self {
            store,
            location_ttl: config.location_ttl,
            search_ring: config.search_ring,
        }
    }

    /// Record a driver's position and add it to the position's cell.
    ///
    /// Both the location entry and the cell set get a fresh TTL. Invalid
    /// coordinates are stored as reported and land in a degenerate cell.
    pub async fn update(&self, driver_id: DriverId, location: Location) -> Result<GeoCell, StoreError> {
        let entry = DriverLocationEntry::new(driver_id, location);
        let location_key = keys::driver_location(driver_id);
        let payload = serde_json::to_string(&entry).map_err(|e| StoreError::Corrupt {
            key: location_key.clone(),
            reason: e.to_string(),
        })?;

        self.store
            .set(&location_key, payload, Some(self.location_ttl))
            .await?;

        let cell = location.cell();
        self.store
            .add_to_set(
                &keys::drivers_in_cell(cell),
                driver_id.to_string(),
                self.location_ttl,
            )
            .await?;

        debug!(driver_id = %driver_id, cell = %cell, "Driver location updated");
        Ok(cell)
    }

    /// Live drivers around `pickup`, using the configured search ring
    pub async fn query(&self, pickup: &Location) -> Result<CandidateSet, StoreError> {
        self.query_within(pickup, self.search_ring).await
    }

    /// Live drivers in the pickup cell and every cell within `ring` grid steps
    pub async fn query_within(&self, pickup: &Location, ring: u32) -> Result<CandidateSet, StoreError> {
        let mut seen = HashSet::new();
        let mut candidates = CandidateSet::new();

        for cell in pickup.cell().disk(ring) {
            let members = self.store.set_members(&keys::drivers_in_cell(cell)).await?;

            for member in members {
                let driver_id = match member.parse::<DriverId>() {
                    Ok(id) => id,
                    Err(_) => {
                        warn!(cell = %cell, member = %member, "Skipping unparsable cell member");
                        continue;
                    },
                };

                if !seen.insert(driver_id) {
                    continue;
                }

                if let Some(entry) = self.location_of(driver_id).await? {
                    candidates.push(DriverCandidate::from(&entry));
                }
            }
        }

        Ok(candidates)
    }

    /// Current location entry of a driver, `None` once it has expired.
    /// A corrupt entry is logged and treated as absent.
    pub async fn location_of(&self, driver_id: DriverId) -> Result<Option<DriverLocationEntry>, StoreError> {
        let key = keys::driver_location(driver_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<DriverLocationEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(driver_id = %driver_id, error = %e, "Ignoring corrupt location entry");
                Ok(None)
            },
        }
    }

    pub fn location_ttl(&self) -> Duration {
        self.location_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use proptest::prelude::*;

    const PICKUP: Location = Location::new(12.9716, 77.5946);

    fn index_with_store() -> (DriverLocationIndex, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let index = DriverLocationIndex::new(store.clone(), &IndexConfig::default());
        (index, store)
    }

    fn ids(candidates: &CandidateSet) -> Vec<u64> {
        let mut ids: Vec<u64> = candidates.iter().map(|c| c.driver_id.get()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_update_then_query_same_cell() {
        let (index, _) = index_with_store();
        index.update(DriverId::new(7), PICKUP).await.unwrap();
        index
            .update(DriverId::new(12), Location::new(12.97161, 77.59461))
            .await
            .unwrap();
        index
            .update(DriverId::new(99), Location::new(19.0760, 72.8777))
            .await
            .unwrap();

        let candidates = index.query(&PICKUP).await.unwrap();
        assert_eq!(ids(&candidates), vec![7, 12]);
    }

    #[tokio::test]
    async fn test_update_overwrites_location() {
        let (index, _) = index_with_store();
        index.update(DriverId::new(7), PICKUP).await.unwrap();
        let moved = Location::new(12.9352, 77.6245);
        index.update(DriverId::new(7), moved).await.unwrap();

        let entry = index.location_of(DriverId::new(7)).await.unwrap().unwrap();
        assert_eq!(entry.location, moved);
    }

    #[tokio::test]
    async fn test_moved_driver_transiently_visible_in_old_cell() {
        let (index, _) = index_with_store();
        index.update(DriverId::new(7), PICKUP).await.unwrap();
        let moved = Location::new(12.9352, 77.6245);
        index.update(DriverId::new(7), moved).await.unwrap();

        let old_cell = index.query(&PICKUP).await.unwrap();
        assert_eq!(ids(&old_cell), vec![7]);
        assert_eq!(old_cell[0].location, moved);
        assert_eq!(ids(&index.query(&moved).await.unwrap()), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_dropped() {
        let (index, store) = index_with_store();
        index.update(DriverId::new(7), PICKUP).await.unwrap();
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        index.update(DriverId::new(12), PICKUP).await.unwrap();
        tokio::time::advance(Duration::from_secs(2 * 60)).await;

        // The cell set was refreshed by driver 12, so 7 is still a member
        let members = store
            .set_members(&keys::drivers_in_cell(PICKUP.cell()))
            .await
            .unwrap();
        assert_eq!(members.len(), 2);

        let candidates = index.query(&PICKUP).await.unwrap();
        assert_eq!(ids(&candidates), vec![12]);
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error_not_empty() {
        let (index, store) = index_with_store();
        index.update(DriverId::new(7), PICKUP).await.unwrap();
        store.set_available(false);

        assert!(matches!(
            index.query(&PICKUP).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(index.update(DriverId::new(8), PICKUP).await.is_err());
    }

    #[tokio::test]
    async fn test_degenerate_coordinates_do_not_fail() {
        let (index, _) = index_with_store();
        let nowhere = Location::new(f64::NAN, f64::NAN);
        let cell = index.update(DriverId::new(3), nowhere).await.unwrap();
        assert!(cell.is_degenerate());
        assert!(index.query(&PICKUP).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_members_and_entries_are_skipped() {
        let (index, store) = index_with_store();
        let cell_key = keys::drivers_in_cell(PICKUP.cell());
        store
            .add_to_set(&cell_key, "not-a-driver".into(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .add_to_set(&cell_key, "5".into(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set(&keys::driver_location(DriverId::new(5)), "{".into(), None)
            .await
            .unwrap();
        index.update(DriverId::new(6), PICKUP).await.unwrap();

        assert_eq!(ids(&index.query(&PICKUP).await.unwrap()), vec![6]);
    }

    #[tokio::test]
    async fn test_ring_search_reaches_neighbouring_cells() {
        let (index, _) = index_with_store();
        let neighbour = PICKUP.cell().disk(1).into_iter().find(|c| *c != PICKUP.cell()).unwrap();
        let neighbour_location = {
            let raw = h3o::CellIndex::try_from(neighbour.raw()).unwrap();
            let center = h3o::LatLng::from(raw);
            Location::new(center.lat(), center.lng())
        };
        index.update(DriverId::new(21), neighbour_location).await.unwrap();

        assert!(index.query(&PICKUP).await.unwrap().is_empty());
        assert_eq!(ids(&index.query_within(&PICKUP, 1).await.unwrap()), vec![21]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_every_live_driver_in_cell_is_found(offsets in proptest::collection::vec((-0.0003f64..0.0003, -0.0003f64..0.0003), 1..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let (index, _) = index_with_store();
                let mut expected = Vec::new();
                for (i, (dlat, dlng)) in offsets.iter().enumerate() {
                    let location = Location::new(PICKUP.lat + dlat, PICKUP.lng + dlng);
                    index.update(DriverId::new(i as u64), location).await.unwrap();
                    if location.cell() == PICKUP.cell() {
                        expected.push(i as u64);
                    }
                }
                let found = ids(&index.query(&PICKUP).await.unwrap());
                prop_assert_eq!(found, expected);
                Ok(())
            })?;
        }
    }
}
