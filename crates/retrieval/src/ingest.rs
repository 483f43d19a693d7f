//! Directory ingestion.
//!
//! Walks a directory of plain-text documents, assigns monotonic vector ids,
//! writes the metadata store, and builds + persists a fresh index. This is
//! the single writer of the metadata file; it must not run concurrently
//! with a retrieval rebuild.

use std::collections::BTreeMap;
use std::path::Path;

use ragline_core::{AppConfig, AppError, AppResult};
use walkdir::WalkDir;

use crate::embeddings::EmbeddingProvider;
use crate::hnsw::{HnswIndex, HnswParams};
use crate::store::{DocumentMetadata, MetadataStore};

/// File extensions treated as ingestible documents.
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Summary of one ingestion run.
#[derive(Debug, Clone, Copy)]
pub struct IngestStats {
    pub documents: usize,
    pub dimension: usize,
}

/// Ingest every document under `docs_dir` into the metadata store and the
/// index configured in `config`.
///
/// Files are visited in sorted path order so repeated runs over the same
/// tree assign the same ids.
pub async fn ingest_directory(
    config: &AppConfig,
    provider: &dyn EmbeddingProvider,
    docs_dir: &Path,
) -> AppResult<IngestStats> {
    let mut mapping: BTreeMap<u64, DocumentMetadata> = BTreeMap::new();
    let mut next_id: u64 = 0;

    let mut walker: Vec<_> = WalkDir::new(docs_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| DOCUMENT_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    walker.sort();

    for path in walker {
        let text = std::fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            tracing::debug!("Skipping empty document {:?}", path);
            continue;
        }

        let source = path
            .strip_prefix(docs_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();

        mapping.insert(next_id, DocumentMetadata::new(text.trim(), source));
        next_id += 1;
    }

    if mapping.is_empty() {
        return Err(AppError::NoMetadata(format!(
            "No ingestible documents under {:?}",
            docs_dir
        )));
    }

    tracing::info!("Ingesting {} documents from {:?}", mapping.len(), docs_dir);

    MetadataStore::new(&config.meta_path).save(&mapping)?;

    let mut entries = Vec::with_capacity(mapping.len());
    for (&id, document) in &mapping {
        let vector = provider.embed(&document.text).await?;
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

    Ok(IngestStats {
        documents: mapping.len(),
        dimension: provider.dimensions(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::store::MetadataStore;

    fn test_config(dir: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.embed_dimensions = 64;
        config.index_path = dir.path().join("index.bin");
        config.meta_path = dir.path().join("meta.json");
        config
    }

    #[tokio::test]
    async fn test_ingest_builds_store_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "Docker is a container platform").unwrap();
        std::fs::write(docs.join("b.md"), "Rust is a systems language").unwrap();
        std::fs::write(docs.join("ignored.json"), "{}").unwrap();

        let config = test_config(&dir);
        let provider = TrigramProvider::new(config.embed_dimensions);

        let stats = ingest_directory(&config, &provider, &docs).await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.dimension, 64);

        let mapping = MetadataStore::new(&config.meta_path).load().unwrap();
        assert_eq!(mapping.len(), 2);
        // Sorted path order: a.txt before b.md
        assert_eq!(mapping[&0].source, "a.txt");
        assert_eq!(mapping[&1].source, "b.md");
        assert!(config.index_path.exists());
    }

    #[tokio::test]
    async fn test_ingest_skips_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("real.txt"), "actual content").unwrap();
        std::fs::write(docs.join("blank.txt"), "   \n").unwrap();

        let config = test_config(&dir);
        let provider = TrigramProvider::new(config.embed_dimensions);

        let stats = ingest_directory(&config, &provider, &docs).await.unwrap();
        assert_eq!(stats.documents, 1);
    }

    #[tokio::test]
    async fn test_ingest_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();

        let config = test_config(&dir);
        let provider = TrigramProvider::new(config.embed_dimensions);

        let err = ingest_directory(&config, &provider, &docs).await.unwrap_err();
        assert!(matches!(err, AppError::NoMetadata(_)));
    }
}
