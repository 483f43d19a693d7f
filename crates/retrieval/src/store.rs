//! Durable vector-id to document metadata binding.
//!
//! A single JSON file maps string-encoded integer ids to `{text, source}`
//! records. The store is written by the ingestion path and read once at
//! retrieval startup; atomic replace is the only concurrency control it
//! needs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ragline_core::{AppError, AppResult};

/// Document fields bound to one vector id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub text: String,
    pub source: String,
}

impl DocumentMetadata {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// File-backed metadata store.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full mapping. A missing file is an empty store, not an
    /// error.
    pub fn load(&self) -> AppResult<BTreeMap<u64, DocumentMetadata>> {
        if !self.path.exists() {
            tracing::debug!("Metadata file {:?} not found; starting empty", self.path);
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| {
            AppError::Serialization(format!(
                "Failed to parse metadata file {:?}: {}",
                self.path, e
            ))
        })
    }

    /// Atomically overwrite the full mapping.
    pub fn save(&self, mapping: &BTreeMap<u64, DocumentMetadata>) -> AppResult<()> {
        let json = serde_json::to_string_pretty(mapping)?;
        atomic_write(&self.path, json.as_bytes())?;
        tracing::debug!("Saved {} metadata entries to {:?}", mapping.len(), self.path);
        Ok(())
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename, so a reader
/// never observes a partial file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
