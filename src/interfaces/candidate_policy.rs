// ============================================================================
// Candidate Policy Interface
// Decides the order in which same-area candidates are offered a booking
// ============================================================================

use crate::domain::{DriverCandidate, Location};

/// Strategy pattern interface for candidate ordering.
/// Implementations: IndexOrder (first available), NearestFirst.
///
/// The matcher still takes the first candidate whose lock and assignment
/// write succeed; a policy only changes who is tried first.
pub trait CandidatePolicy: Send + Sync {
    /// Reorder `candidates` in place
    ///
    /// # Arguments
    /// * `pickup` - The booking's pickup location
    /// * `candidates` - Live drivers returned by the location index
    fn order_candidates(&self, pickup: &Location, candidates: &mut [DriverCandidate]);

    /// Get the policy name for logging/metrics
    fn name(&self) -> &str;
}
