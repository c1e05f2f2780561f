// ============================================================================
// Location and Geographic Cells
// WGS-84 coordinates and the fixed-precision H3 partition used for lookup
// ============================================================================

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};
use std::fmt;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS-84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both coordinates are finite and inside the WGS-84 range
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &Location) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lng.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lng.to_radians());
        let sin_dlat = ((lat2 - lat1) * 0.5).sin();
        let sin_dlon = ((lon2 - lon1) * 0.5).sin();
        let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
        2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
    }

    pub fn cell(&self) -> GeoCell {
        GeoCell::from_location(self)
    }
}

// ============================================================================
// Geo Cell
// ============================================================================

/// Spatial partition key at a fixed H3 resolution.
///
/// Out-of-range latitudes are clamped and longitudes wrapped before indexing.
/// Non-finite coordinates map to [`GeoCell::DEGENERATE`], a cell no real
/// position ever lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeoCell(u64);

impl GeoCell {
    /// Changing this invalidates every standing index entry
    pub const RESOLUTION: Resolution = Resolution::Nine;

    pub const DEGENERATE: GeoCell = GeoCell(0);

    pub fn from_location(location: &Location) -> Self {
        if !location.lat.is_finite() || !location.lng.is_finite() {
            return Self::DEGENERATE;
        }

        let lat = location.lat.clamp(-90.0, 90.0);
        let lng = (location.lng + 180.0).rem_euclid(360.0) - 180.0;

        match LatLng::new(lat, lng) {
            Ok(coord) => Self(u64::from(coord.to_cell(Self::RESOLUTION))),
            Err(_) => Self::DEGENERATE,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.0 == 0
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// This cell plus every cell within `k` grid steps. A degenerate cell has
    /// no neighbours.
    pub fn disk(&self, k: u32) -> Vec<GeoCell> {
        if k == 0 {
            return vec![*self];
        }
        match CellIndex::try_from(self.0) {
            Ok(index) => index
                .grid_disk::<Vec<_>>(k)
                .into_iter()
                .map(|cell| GeoCell(u64::from(cell)))
                .collect(),
            Err(_) => vec![*self],
        }
    }
}

impl fmt::Display for GeoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nearby_points_share_a_cell() {
        let a = Location::new(12.9716, 77.5946);
        let b = Location::new(12.97161, 77.59461);
        assert_eq!(a.cell(), b.cell());
        assert!(!a.cell().is_degenerate());
    }

    #[test]
    fn test_distant_points_do_not_share_a_cell() {
        let bangalore = Location::new(12.9716, 77.5946);
        let mumbai = Location::new(19.0760, 72.8777);
        assert_ne!(bangalore.cell(), mumbai.cell());
    }

    #[test]
    fn test_non_finite_coordinates_are_degenerate() {
        assert!(Location::new(f64::NAN, 10.0).cell().is_degenerate());
        assert!(Location::new(10.0, f64::INFINITY).cell().is_degenerate());
        assert_eq!(GeoCell::DEGENERATE.disk(2), vec![GeoCell::DEGENERATE]);
    }

    #[test]
    fn test_out_of_range_coordinates_still_index() {
        let wrapped = Location::new(500.0, 540.0);
        assert!(!wrapped.is_valid());
        assert!(!wrapped.cell().is_degenerate());
    }

    #[test]
    fn test_disk_contains_origin() {
        let origin = Location::new(52.52, 13.405).cell();
        let disk = origin.disk(1);
        assert_eq!(disk.len(), 7);
        assert!(disk.contains(&origin));
    }

    #[test]
    fn test_distance() {
        let a = Location::new(0.0, 0.0);
        let b = Location::new(0.0, 1.0);
        assert!((a.distance_km(&b) - 111.19).abs() < 0.1);
        assert_eq!(a.distance_km(&a), 0.0);
    }

    proptest! {
        #[test]
        fn prop_cell_is_deterministic(lat in -1000.0f64..1000.0, lng in -1000.0f64..1000.0) {
            let location = Location::new(lat, lng);
            prop_assert_eq!(location.cell(), location.cell());
            prop_assert!(!location.cell().is_degenerate());
        }
    }
}
