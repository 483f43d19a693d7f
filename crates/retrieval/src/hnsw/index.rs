//! Hierarchical navigable small-world graph.
//!
//! Search starts at a single entry point on the sparsest layer, descends
//! greedily to layer 0, then runs a beam search whose breadth is the
//! caller-supplied `ef`. Layer assignment uses a deterministic LCG so that
//! building the same entries twice yields the same graph.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

use ragline_core::{AppError, AppResult};

use super::distance::{cosine_distance, norm};
use super::node::Node;
use super::pqueue::Candidate;
use crate::store::atomic_write;

/// File magic: "RLIX".
const MAGIC: u32 = 0x524c_4958;
/// Bump when the on-disk layout changes.
const FORMAT_VERSION: u16 = 1;
/// Hard cap on layer assignment.
const MAX_LEVEL: u8 = 16;

/// Graph construction parameters.
///
/// `m` bounds the bidirectional links per node per layer (layer 0 allows
/// `2m`); `ef_construction` bounds the candidate list explored while
/// inserting each node. Both trade build cost for recall monotonically.
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
        }
    }
}

/// Approximate nearest-neighbor index over cosine space.
#[derive(Debug)]
pub struct HnswIndex {
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    /// `1 / ln(m)`, the layer decay factor.
    level_mult: f64,
    dimension: usize,
    nodes: HashMap<u64, Node>,
    entry_point: Option<u64>,
    level_max: u8,
    rng_state: u64,
    built: bool,
}

impl HnswIndex {
    /// Create an empty, unbuilt index for vectors of `dimension`.
    pub fn new(dimension: usize, params: HnswParams) -> AppResult<Self> {
        if dimension == 0 {
            return Err(AppError::Config(
                "Index dimension must be non-zero".to_string(),
            ));
        }
        if params.m < 2 {
            return Err(AppError::Config(format!(
                "M must be at least 2, got {}",
                params.m
            )));
        }

        Ok(Self {
            m: params.m,
            m_max0: params.m * 2,
            ef_construction: params.ef_construction.max(1),
            level_mult: 1.0 / (params.m as f64).ln(),
            dimension,
            nodes: HashMap::new(),
            entry_point: None,
            level_max: 0,
            rng_state: 0x5261_676c_696e_6501,
            built: false,
        })
    }

    /// Build the graph from `(vector_id, vector)` entries.
    ///
    /// Ids must be unique; dimension must match the index. The entry order
    /// determines the graph exactly, so callers that need reproducible
    /// builds should pass entries in a stable order.
    pub fn build(&mut self, entries: Vec<(u64, Vec<f32>)>) -> AppResult<()> {
        for (id, vector) in entries {
            self.insert(id, vector)?;
        }
        self.built = true;
        tracing::debug!("Built HNSW index: {} vectors", self.nodes.len());
        Ok(())
    }

    /// Approximate k-nearest-neighbor query.
    ///
    /// Returns up to `k` `(vector_id, cosine_distance)` pairs in ascending
    /// distance, ties broken by id. `ef` bounds the layer-0 beam width
    /// independently of `ef_construction`; the effective breadth is
    /// `max(ef, k)`.
    pub fn query(&self, vector: &[f32], k: usize, ef: usize) -> AppResult<Vec<(u64, f32)>> {
        if !self.built {
            return Err(AppError::NotBuilt);
        }
        if vector.len() != self.dimension {
            return Err(AppError::Config(format!(
                "Query dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        let entry = match self.entry_point {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(vector);

        let mut ep = entry;
        let mut layer = self.level_max;
        while layer > 0 {
            ep = self.greedy_descend(ep, vector, query_norm, layer);
            layer -= 1;
        }

        let beam = self.search_layer(ep, vector, query_norm, ef.max(k), 0);

        Ok(beam
            .into_iter()
            .take(k)
            .map(|c| (c.id, c.distance))
            .collect())
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dimension fixed at creation time.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// All inserted ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------
    // Construction internals
    // ------------------------------------------------------------------

    fn insert(&mut self, id: u64, vector: Vec<f32>) -> AppResult<()> {
        if vector.len() != self.dimension {
            return Err(AppError::Config(format!(
                "Vector {} has dimension {}, index expects {}",
                id,
                vector.len(),
                self.dimension
            )));
        }
        if self.nodes.contains_key(&id) {
            return Err(AppError::Config(format!("Duplicate vector id {}", id)));
        }

        let level = self.select_level();

        // First node becomes the entry point
        let Some(mut ep) = self.entry_point else {
            self.nodes.insert(id, Node::new(id, vector, level));
            self.entry_point = Some(id);
            self.level_max = level;
            return Ok(());
        };

        let vector_norm = norm(&vector);

        // Greedy descent through the layers above the node's level
        let mut layer = self.level_max;
        while layer > level {
            ep = self.greedy_descend(ep, &vector, vector_norm, layer);
            layer -= 1;
        }

        self.nodes.insert(id, Node::new(id, vector, level));

        // Link into each layer from the node's level down to 0
        for lc in (0..=level.min(self.level_max)).rev() {
            let vector = self.nodes[&id].vector.clone();
            let found = self.search_layer(ep, &vector, vector_norm, self.ef_construction, lc);

            let limit = if lc == 0 { self.m_max0 } else { self.m };
            let selected: Vec<u64> = found.iter().take(limit).map(|c| c.id).collect();

            for &neighbor in &selected {
                self.link(neighbor, id, lc);
                self.link(id, neighbor, lc);
            }
            for &neighbor in &selected {
                self.prune(neighbor, lc, limit);
            }

            if let Some(best) = found.first() {
                ep = best.id;
            }
        }

        if level > self.level_max {
            self.entry_point = Some(id);
            self.level_max = level;
        }

        Ok(())
    }

    /// Draw a layer from the exponential decay distribution.
    fn select_level(&mut self) -> u8 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        // Uniform in (0, 1]
        let uniform = ((self.rng_state >> 33) as f64 + 1.0) / (1u64 << 31) as f64;
        let level = (-uniform.ln() * self.level_mult).floor();
        (level as u8).min(MAX_LEVEL)
    }

    /// Follow the single best neighbor until no improvement at `layer`.
    fn greedy_descend(&self, entry: u64, query: &[f32], query_norm: f32, layer: u8) -> u64 {
        let mut current = entry;
        let mut current_dist = self.distance_to(current, query, query_norm);

        loop {
            let mut improved = false;
            for &neighbor in self.nodes[&current].neighbors_at(layer) {
                let d = self.distance_to(neighbor, query, query_norm);
                if d < current_dist {
                    current = neighbor;
                    current_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Beam search at a single layer; returns up to `ef` candidates sorted
    /// ascending by `(distance, id)`.
    fn search_layer(
        &self,
        entry: u64,
        query: &[f32],
        query_norm: f32,
        ef: usize,
        layer: u8,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<u64> = HashSet::new();
        // Explore nearest-first
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        // Retain the ef best seen so far; the worst sits on top
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        let entry_candidate = Candidate {
            distance: self.distance_to(entry, query, query_norm),
            id: entry,
        };
        visited.insert(entry);
        frontier.push(Reverse(entry_candidate));
        best.push(entry_candidate);

        while let Some(Reverse(current)) = frontier.pop() {
            let worst = best
                .peek()
                .map(|c| c.distance)
                .unwrap_or(f32::INFINITY);
            if best.len() >= ef && current.distance > worst {
                break;
            }

            for &neighbor in self.nodes[&current.id].neighbors_at(layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = Candidate {
                    distance: self.distance_to(neighbor, query, query_norm),
                    id: neighbor,
                };
                let worst = best
                    .peek()
                    .map(|c| c.distance)
                    .unwrap_or(f32::INFINITY);
                if best.len() < ef || candidate.distance < worst {
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        let mut result = best.into_vec();
        result.sort_unstable();
        result
    }

    fn link(&mut self, from: u64, to: u64, layer: u8) {
        if let Some(node) = self.nodes.get_mut(&from) {
            while node.neighbors.len() <= layer as usize {
                node.neighbors.push(Vec::new());
            }
            let list = &mut node.neighbors[layer as usize];
            if !list.contains(&to) {
                list.push(to);
            }
        }
    }

    /// Drop the farthest links when a node exceeds its per-layer budget.
    fn prune(&mut self, id: u64, layer: u8, limit: usize) {
        let (vector, vector_norm, links) = {
            let node = match self.nodes.get(&id) {
                Some(n) => n,
                None => return,
            };
            let links = node.neighbors_at(layer);
            if links.len() <= limit {
                return;
            }
            (node.vector.clone(), node.norm, links.to_vec())
        };

        let mut scored: Vec<Candidate> = links
            .into_iter()
            .map(|nid| Candidate {
                distance: self.distance_to(nid, &vector, vector_norm),
                id: nid,
            })
            .collect();
        scored.sort_unstable();
        scored.truncate(limit);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.neighbors[layer as usize] = scored.into_iter().map(|c| c.id).collect();
        }
    }

    fn distance_to(&self, id: u64, query: &[f32], query_norm: f32) -> f32 {
        match self.nodes.get(&id) {
            Some(node) => cosine_distance(&node.vector, query, node.norm, query_norm),
            None => f32::INFINITY,
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize the full graph to `path`, atomically.
    pub fn persist(&self, path: &Path) -> AppResult<()> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buf.extend_from_slice(&(self.m as u32).to_le_bytes());
        buf.extend_from_slice(&(self.ef_construction as u32).to_le_bytes());
        buf.push(self.level_max);
        match self.entry_point {
            Some(id) => {
                buf.push(1);
                buf.extend_from_slice(&id.to_le_bytes());
            }
            None => {
                buf.push(0);
                buf.extend_from_slice(&0u64.to_le_bytes());
            }
        }
        buf.extend_from_slice(&(self.nodes.len() as u64).to_le_bytes());

        // Stable node order keeps the blob reproducible
        for id in self.ids() {
            let node = &self.nodes[&id];
            buf.extend_from_slice(&node.id.to_le_bytes());
            buf.push(node.neighbors.len() as u8);
            for &value in &node.vector {
                buf.extend_from_slice(&value.to_le_bytes());
            }
            for layer in &node.neighbors {
                buf.extend_from_slice(&(layer.len() as u32).to_le_bytes());
                for &neighbor in layer {
                    buf.extend_from_slice(&neighbor.to_le_bytes());
                }
            }
        }

        atomic_write(path, &buf)?;
        tracing::info!("Persisted index ({} vectors) to {:?}", self.nodes.len(), path);
        Ok(())
    }

    /// Restore a persisted graph. The loaded index answers exact-duplicate
    /// queries identically to the instance that was persisted.
    pub fn load(path: &Path) -> AppResult<Self> {
        let bytes = std::fs::read(path)?;
        let mut r = Reader::new(&bytes);

        if r.u32()? != MAGIC {
            return Err(AppError::Serialization(format!(
                "{:?} is not an index file",
                path
            )));
        }
        let version = r.u16()?;
        if version != FORMAT_VERSION {
            return Err(AppError::Serialization(format!(
                "Unsupported index format version {}",
                version
            )));
        }

        let dimension = r.u32()? as usize;
        let m = r.u32()? as usize;
        let ef_construction = r.u32()? as usize;
        let level_max = r.u8()?;
        let has_entry = r.u8()? != 0;
        let entry_raw = r.u64()?;
        let node_count = r.u64()? as usize;

        let mut index = Self::new(
            dimension,
            HnswParams {
                m,
                ef_construction,
            },
        )?;
        index.level_max = level_max;
        index.entry_point = has_entry.then_some(entry_raw);

        for _ in 0..node_count {
            let id = r.u64()?;
            let layer_count = r.u8()? as usize;
            if layer_count == 0 {
                return Err(AppError::Serialization(format!(
                    "Node {} has no layers",
                    id
                )));
            }

            let mut vector = Vec::with_capacity(dimension);
            for _ in 0..dimension {
                vector.push(r.f32()?);
            }

            let mut node = Node::new(id, vector, (layer_count - 1) as u8);
            for layer in node.neighbors.iter_mut() {
                let count = r.u32()? as usize;
                layer.reserve(count);
                for _ in 0..count {
                    layer.push(r.u64()?);
                }
            }
            index.nodes.insert(id, node);
        }

        index.built = true;
        tracing::info!("Loaded index ({} vectors) from {:?}", index.nodes.len(), path);
        Ok(index)
    }
}

/// Little-endian cursor over a persisted blob.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> AppResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(AppError::Serialization(
                "Unexpected end of index file".to_string(),
            )),
        }
    }

    fn u8(&mut self) -> AppResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> AppResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> AppResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> AppResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> AppResult<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random unit-ish vectors for graph tests.
    fn test_vectors(count: usize, dimension: usize) -> Vec<(u64, Vec<f32>)> {
        let mut state: u64 = 0xdead_beef_cafe_f00d;
        (0..count)
            .map(|i| {
                let vector = (0..dimension)
                    .map(|_| {
                        state = state
                            .wrapping_mul(6364136223846793005)
                            .wrapping_add(1442695040888963407);
                        ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
                    })
                    .collect();
                (i as u64, vector)
            })
            .collect()
    }

    fn built_index(count: usize, dimension: usize) -> (HnswIndex, Vec<(u64, Vec<f32>)>) {
        let entries = test_vectors(count, dimension);
        let mut index = HnswIndex::new(dimension, HnswParams::default()).unwrap();
        index.build(entries.clone()).unwrap();
        (index, entries)
    }

    #[test]
    fn test_query_before_build_fails() {
        let index = HnswIndex::new(8, HnswParams::default()).unwrap();
        let err = index.query(&[0.0; 8], 3, 64).unwrap_err();
        assert!(matches!(err, AppError::NotBuilt));
    }

    #[test]
    fn test_build_empty_then_query_returns_nothing() {
        let mut index = HnswIndex::new(8, HnswParams::default()).unwrap();
        index.build(Vec::new()).unwrap();
        assert!(index.query(&[0.0; 8], 3, 64).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_config_error() {
        let (index, _) = built_index(10, 8);
        let err = index.query(&[0.0; 4], 3, 64).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut index = HnswIndex::new(4, HnswParams::default()).unwrap();
        let err = index
            .build(vec![(7, vec![1.0; 4]), (7, vec![0.5; 4])])
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_exact_query_returns_inserted_id_at_zero_distance() {
        let (index, entries) = built_index(60, 16);

        for (id, vector) in entries.iter().take(10) {
            let results = index.query(vector, 1, 64).unwrap();
            assert_eq!(results[0].0, *id);
            assert!(results[0].1.abs() < 1e-4, "distance {}", results[0].1);
        }
    }

    #[test]
    fn test_results_bounded_by_k_and_sorted() {
        let (index, entries) = built_index(50, 8);

        let results = index.query(&entries[3].1, 5, 64).unwrap();
        assert!(results.len() <= 5);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_k_larger_than_index_returns_everything_found() {
        let (index, entries) = built_index(5, 8);
        let results = index.query(&entries[0].1, 50, 64).unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_identical_builds_answer_identically() {
        let (a, entries) = built_index(40, 8);
        let (b, _) = built_index(40, 8);

        for (_, vector) in entries.iter().take(5) {
            assert_eq!(a.query(vector, 4, 32).unwrap(), b.query(vector, 4, 32).unwrap());
        }
    }

    #[test]
    fn test_persist_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");

        let (index, entries) = built_index(30, 8);
        index.persist(&path).unwrap();

        let loaded = HnswIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.ids(), index.ids());
        assert_eq!(loaded.dimension(), index.dimension());

        for (id, vector) in entries.iter().take(10) {
            let results = loaded.query(vector, 1, 64).unwrap();
            assert_eq!(results[0].0, *id);
            assert!(results[0].1.abs() < 1e-4);
        }
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        std::fs::write(&path, b"not an index").unwrap();

        let err = HnswIndex::load(&path).unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
