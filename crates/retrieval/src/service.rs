//! The composed retrieval operation.
//!
//! `RetrievalService` owns the index, the metadata mapping, and the
//! embedding cache exclusively; the provider is shared. One service
//! instance lives inside the retrieval stage's event loop, so no internal
//! locking is needed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use ragline_core::{AppConfig, AppError, AppResult};

use crate::cache::EmbeddingCache;
use crate::embeddings::EmbeddingProvider;
use crate::hnsw::{score, HnswIndex, HnswParams};
use crate::store::{DocumentMetadata, MetadataStore};

/// Retrieval engine: embedding provider + ANN index + metadata + cache.
pub struct RetrievalService {
    provider: Arc<dyn EmbeddingProvider>,
    index: HnswIndex,
    metadata: BTreeMap<u64, DocumentMetadata>,
    cache: EmbeddingCache,
    ef: usize,
    index_path: PathBuf,
}

impl std::fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("provider", &"<dyn EmbeddingProvider>")
            .field("index", &self.index)
            .field("metadata", &self.metadata)
            .field("ef", &self.ef)
            .field("index_path", &self.index_path)
            .finish()
    }
}

impl RetrievalService {
    /// Open the service from persisted state.
    ///
    /// A present index file is loaded and checked against the provider
    /// dimension. A missing index file is rebuilt from the metadata store
    /// when `rebuild_if_missing` is set, and a fatal configuration error
    /// otherwise.
    pub async fn open(
        config: &AppConfig,
        provider: Arc<dyn EmbeddingProvider>,
        rebuild_if_missing: bool,
    ) -> AppResult<Self> {
        let store = MetadataStore::new(&config.meta_path);
        let metadata = store.load()?;
        let mut cache = EmbeddingCache::new(config.cache_capacity)?;

        let index = if config.index_path.exists() {
            tracing::info!("Loading index from {:?}", config.index_path);
            let index = HnswIndex::load(&config.index_path)?;
            if index.dimension() != provider.dimensions() {
                return Err(AppError::Config(format!(
                    "Index dimension {} does not match provider dimension {}",
                    index.dimension(),
                    provider.dimensions()
                )));
            }
            index
        } else if rebuild_if_missing {
            tracing::info!("Index {:?} not found; rebuilding from metadata", config.index_path);
            Self::rebuild(config, provider.as_ref(), &metadata, &mut cache).await?
        } else {
            return Err(AppError::Config(format!(
                "Index {:?} not found. Enable rebuild or run the ingestion path first.",
                config.index_path
            )));
        };

        Ok(Self {
            provider,
            index,
            metadata,
            cache,
            ef: config.ef,
            index_path: config.index_path.clone(),
        })
    }

    /// Re-embed every stored document, build a fresh index, persist it, and
    /// warm the cache with the fresh vectors.
    async fn rebuild(
        config: &AppConfig,
        provider: &dyn EmbeddingProvider,
        metadata: &BTreeMap<u64, DocumentMetadata>,
        cache: &mut EmbeddingCache,
    ) -> AppResult<HnswIndex> {
        if metadata.is_empty() {
            return Err(AppError::NoMetadata(format!(
                "Metadata store {:?} is empty; nothing to rebuild from",
                config.meta_path
            )));
        }

        let mut entries = Vec::with_capacity(metadata.len());
        for (&id, document) in metadata {
            let vector = provider.embed(&document.text).await?;
            cache.put(&document.text, vector.clone());
            entries.push((id, vector));
        }

        let mut index = HnswIndex::new(
            provider.dimensions(),
            HnswParams {
                m: config.m,
                ef_construction: config.ef_construction,
            },
        )?;
        index.build(entries)?;
        index.persist(&config.index_path)?;

        tracing::info!("Rebuilt index over {} documents", metadata.len());
        Ok(index)
    }

    /// Ranked retrieval: up to `k` `(score, metadata)` pairs, best first.
    ///
    /// Empty and whitespace-only queries short-circuit to an empty result
    /// without touching the provider or the index. A vector id with no
    /// metadata yields an empty document rather than failing the search.
    pub async fn search(
        &mut self,
        query: &str,
        k: usize,
    ) -> AppResult<Vec<(f32, DocumentMetadata)>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector = match self.cache.get(query) {
            Some(vector) => {
                tracing::debug!("Query embedding served from cache");
                vector
            }
            None => {
                let vector = self.provider.embed(query).await?;
                self.cache.put(query, vector.clone());
                vector
            }
        };

        let neighbors = self.index.query(&vector, k, self.ef)?;

        let results = neighbors
            .into_iter()
            .map(|(id, distance)| {
                let document = match self.metadata.get(&id) {
                    Some(document) => document.clone(),
                    None => {
                        tracing::warn!("No metadata for vector id {}", id);
                        DocumentMetadata::default()
                    }
                };
                (score(distance), document)
            })
            .collect();

        Ok(results)
    }

    /// The `text` projection of [`search`](Self::search), same order.
    pub async fn get_contexts(&mut self, query: &str, k: usize) -> AppResult<Vec<String>> {
        let results = self.search(query, k).await?;
        Ok(results.into_iter().map(|(_, doc)| doc.text).collect())
    }

    /// `(documents, indexed vectors)` counts.
    pub fn stats(&self) -> (usize, usize) {
        (self.metadata.len(), self.index.len())
    }

    /// Ids currently present in the index, ascending.
    pub fn index_ids(&self) -> Vec<u64> {
        self.index.ids()
    }

    /// Path the index was loaded from or rebuilt to.
    pub fn index_path(&self) -> &std::path::Path {
        &self.index_path
    }
}
