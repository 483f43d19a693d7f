//! Generation provider factory.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use ragline_core::{AppError, AppResult};
use std::sync::Arc;

/// Create a generation client for the named provider.
///
/// Only Ollama is wired today; the factory exists so the pipeline stays
/// provider-agnostic when others are added.
pub fn create_client(provider: &str, base_url: &str) -> AppResult<Arc<dyn LlmClient>> {
    match provider {
        "ollama" => Ok(Arc::new(OllamaClient::new(base_url))),
        other => Err(AppError::Config(format!(
            "Unknown generation provider: '{}'. Supported providers: ollama",
            other
        ))),
    }
}
