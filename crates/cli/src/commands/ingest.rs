//! Ingest command handler.

use clap::Args;
use std::path::PathBuf;

use ragline_core::{AppConfig, AppResult};
use ragline_retrieval::{create_provider, ingest::ingest_directory};

/// Ingest a directory of documents into the metadata store and index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Directory holding .txt and .md documents
    pub dir: PathBuf,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let provider = create_provider(config)?;

        let stats = ingest_directory(config, provider.as_ref(), &self.dir).await?;

        println!(
            "Ingested {} documents ({} dimensions)",
            stats.documents, stats.dimension
        );
        println!("Metadata: {:?}", config.meta_path);
        println!("Index:    {:?}", config.index_path);

        Ok(())
    }
}
