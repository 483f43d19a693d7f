//! Query embedding memoization.
//!
//! Embedding the same question twice is pure waste, so resolved query
//! vectors are kept in a bounded LRU keyed by a digest of the normalized
//! text. The cache is best-effort: eviction or a lost race simply costs one
//! re-embed.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

use ragline_core::{AppError, AppResult};

/// Bounded LRU cache of `text -> embedding`.
pub struct EmbeddingCache {
    entries: LruCache<String, Vec<f32>>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` embeddings.
    pub fn new(capacity: usize) -> AppResult<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| AppError::Config("Cache capacity must be non-zero".to_string()))?;
        Ok(Self {
            entries: LruCache::new(capacity),
        })
    }

    /// Cache key: SHA-256 hex digest of the whitespace-normalized text.
    ///
    /// Normalization means two renderings of the same question ("what is
    /// docker" vs. " what  is docker ") share one entry; hashing keeps the
    /// key size independent of the question size.
    pub fn key(text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let digest = Sha256::digest(normalized.as_bytes());
        format!("{:x}", digest)
    }

    /// Look up the embedding for `text`, refreshing its recency.
    pub fn get(&mut self, text: &str) -> Option<Vec<f32>> {
        self.entries.get(&Self::key(text)).cloned()
    }

    /// Store the embedding for `text`, evicting the least recently used
    /// entry when full.
    pub fn put(&mut self, text: &str, vector: Vec<f32>) {
        self.entries.put(Self::key(text), vector);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
