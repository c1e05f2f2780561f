// ============================================================================
// Candidate Ordering Policies
// Which same-area driver is offered a booking first
// ============================================================================

use crate::domain::{DriverCandidate, Location};
use crate::interfaces::CandidatePolicy;

/// First available: keep the order the location index returned.
///
/// The index makes no ordering promise, so this is effectively arbitrary.
/// It is also the cheapest policy and the one the matcher uses by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOrder;

impl IndexOrder {
    pub fn new() -> Self {
        Self
    }
}

impl CandidatePolicy for IndexOrder {
    fn order_candidates(&self, _pickup: &Location, _candidates: &mut [DriverCandidate]) {}

    fn name(&self) -> &str {
        "IndexOrder"
    }
}

/// Nearest driver first, by great-circle distance to the pickup.
///
/// # Example
/// ```text
/// Pickup:     (12.9716, 77.5946)
/// Candidates: 7 @ 900m, 12 @ 150m, 19 @ 400m
///
/// Offer order: 12, 19, 7
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestFirst;

impl NearestFirst {
    pub fn new() -> Self {
        Self
    }
}

impl CandidatePolicy for NearestFirst {
    fn order_candidates(&self, pickup: &Location, candidates: &mut [DriverCandidate]) {
        // Stable, so equidistant drivers keep index order
        candidates.sort_by(|a, b| {
            distance_or_max(pickup, &a.location).total_cmp(&distance_or_max(pickup, &b.location))
        });
    }

    fn name(&self) -> &str {
        "NearestFirst"
    }
}

/// Unplottable positions sort last
fn distance_or_max(pickup: &Location, location: &Location) -> f64 {
    let distance = location.distance_km(pickup);
    if distance.is_nan() {
        f64::INFINITY
    } else {
        distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DriverId;

    const PICKUP: Location = Location::new(12.9716, 77.5946);

    fn candidate(id: u64, lat: f64, lng: f64) -> DriverCandidate {
        DriverCandidate {
            driver_id: DriverId::new(id),
            location: Location::new(lat, lng),
        }
    }

    fn order(policy: &dyn CandidatePolicy, candidates: &mut [DriverCandidate]) -> Vec<u64> {
        policy.order_candidates(&PICKUP, candidates);
        candidates.iter().map(|c| c.driver_id.get()).collect()
    }

    #[test]
    fn test_index_order_keeps_order() {
        let mut candidates = [
            candidate(7, 12.9800, 77.5946),
            candidate(12, 12.9717, 77.5946),
        ];
        assert_eq!(order(&IndexOrder, &mut candidates), vec![7, 12]);
    }

    #[test]
    fn test_nearest_first() {
        let mut candidates = [
            candidate(7, 12.9797, 77.5946),
            candidate(12, 12.9730, 77.5946),
            candidate(19, 12.9752, 77.5946),
        ];
        assert_eq!(order(&NearestFirst, &mut candidates), vec![12, 19, 7]);
    }

    #[test]
    fn test_nearest_first_sorts_nan_last() {
        let mut candidates = [
            candidate(3, f64::NAN, f64::NAN),
            candidate(4, 12.9720, 77.5946),
        ];
        assert_eq!(order(&NearestFirst, &mut candidates), vec![4, 3]);
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(IndexOrder::new().name(), "IndexOrder");
        assert_eq!(NearestFirst::new().name(), "NearestFirst");
    }
}
