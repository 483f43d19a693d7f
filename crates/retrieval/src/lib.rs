//! Vector similarity retrieval engine.
//!
//! Composes an approximate nearest-neighbor index, a durable metadata store,
//! a bounded embedding cache, and pluggable embedding providers into a
//! `search(query, k) -> ranked contexts` operation.
//!
//! # Components
//!
//! - [`hnsw`] - graph-based ANN index over cosine space
//! - [`store`] - durable `vector_id -> DocumentMetadata` binding
//! - [`cache`] - LRU memoization of query embeddings
//! - [`embeddings`] - provider abstraction (Ollama, trigram)
//! - [`service`] - the composed retrieval operation
//! - [`ingest`] - directory ingestion feeding store and index

pub mod cache;
pub mod embeddings;
pub mod hnsw;
pub mod ingest;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use cache::EmbeddingCache;
pub use embeddings::{create_provider, EmbeddingProvider};
pub use hnsw::{score, HnswIndex, HnswParams};
pub use service::RetrievalService;
pub use store::{DocumentMetadata, MetadataStore};
