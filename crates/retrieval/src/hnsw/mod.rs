//! Approximate nearest-neighbor index.
//!
//! A hierarchical navigable small-world graph over cosine space with
//! insert-at-build-time semantics, independent build-time and query-time
//! exploration budgets, and binary persistence.

mod distance;
mod index;
mod node;
mod pqueue;

pub use distance::{cosine_distance, score};
pub use index::{HnswIndex, HnswParams};
