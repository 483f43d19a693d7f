//! Heap ordering for search candidates.

use std::cmp::Ordering;

/// A candidate neighbor ordered by distance, ties broken by id.
///
/// The id tie-break gives heaps (and therefore query results) a total,
/// deterministic order for a fixed index state even when distances collide.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub distance: f32,
    pub id: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.id == other.id
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // NaN distances never arise from cosine_distance on finite input;
        // treat them as equal to keep the ordering total.
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}
