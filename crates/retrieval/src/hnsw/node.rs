//! Graph node storage.

use super::distance::norm;

/// A single vector in the graph with its per-layer adjacency lists.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub id: u64,
    pub vector: Vec<f32>,
    /// Cached Euclidean norm of `vector`.
    pub norm: f32,
    /// `neighbors[l]` holds the ids linked at layer `l`; the node's top
    /// layer is `neighbors.len() - 1`.
    pub neighbors: Vec<Vec<u64>>,
}

impl Node {
    pub fn new(id: u64, vector: Vec<f32>, level: u8) -> Self {
        let norm = norm(&vector);
        Self {
            id,
            vector,
            norm,
            neighbors: vec![Vec::new(); level as usize + 1],
        }
    }

    /// Ids linked at `layer`, empty above the node's top layer.
    pub fn neighbors_at(&self, layer: u8) -> &[u64] {
        self.neighbors
            .get(layer as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
