// ============================================================================
// Driver Domain Model
// ============================================================================

use super::{DriverId, Location};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last reported position of a driver, as stored in the location index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverLocationEntry {
    pub driver_id: DriverId,
    pub location: Location,
    pub last_updated: DateTime<Utc>,
}

impl DriverLocationEntry {
    pub fn new(driver_id: DriverId, location: Location) -> Self {
        Self {
            driver_id,
            location,
            last_updated: Utc::now(),
        }
    }
}

/// A driver returned by a proximity lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverCandidate {
    pub driver_id: DriverId,
    pub location: Location,
}

impl From<&DriverLocationEntry> for DriverCandidate {
    fn from(entry: &DriverLocationEntry) -> Self {
        Self {
            driver_id: entry.driver_id,
            location: entry.location,
        }
    }
}
