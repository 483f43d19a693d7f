//! Search command handler.
//!
//! Retrieval only: embeds the query, queries the index, and prints the
//! ranked contexts with their scores.

use clap::Args;

use ragline_core::{AppConfig, AppResult};
use ragline_retrieval::{create_provider, RetrievalService};

/// Print the ranked contexts for a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// The query text
    pub query: String,

    /// Number of results to return
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Rebuild the index from the metadata store if no index file exists
    #[arg(long)]
    pub rebuild: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let provider = create_provider(config)?;
        let mut service = RetrievalService::open(config, provider, self.rebuild).await?;

        let k = self.k.unwrap_or(config.top_k);
        let results = service.search(&self.query, k).await?;

        if results.is_empty() {
            println!("No matches.");
            return Ok(());
        }

        for (score, document) in results {
            println!(
                "[score={:.3}] {} \u{2192} {}",
                score,
                document.source,
                truncate(&document.text, 120)
            );
        }

        Ok(())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\u{2026}", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_is_untouched() {
        assert_eq!(truncate("short", 120), "short");
    }

    #[test]
    fn test_truncate_long_text_gets_ellipsis() {
        let long = "x".repeat(200);
        let shown = truncate(&long, 120);
        assert_eq!(shown.chars().count(), 121);
        assert!(shown.ends_with('\u{2026}'));
    }
}
