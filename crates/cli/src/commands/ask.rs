//! Ask command handler.
//!
//! Runs the whole pipeline in one process: broker, retrieval stage, and
//! generation stage as tasks, with this command acting as the intake
//! layer.

use clap::Args;
use std::sync::Arc;

use ragline_bus::{Broker, RequestStatus};
use ragline_core::{AppConfig, AppError, AppResult};
use ragline_llm::create_client;
use ragline_pipeline::{GenerationStage, Intake, RetrievalStage};
use ragline_retrieval::{create_provider, RetrievalService};

/// Ask a question through the full pipeline
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of contexts to retrieve
    #[arg(short, long)]
    pub k: Option<usize>,

    /// Rebuild the index from the metadata store if no index file exists
    #[arg(long)]
    pub rebuild: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::debug!("Ask command options: {:?}", self);

        let provider = create_provider(config)?;
        let service = RetrievalService::open(config, provider, self.rebuild).await?;
        let client = create_client("ollama", &config.ollama_url)?;

        let broker = Arc::new(Broker::new(config.bus_capacity));
        let retrieval = RetrievalStage::new(broker.clone(), service, config);
        let generation = GenerationStage::new(broker.clone(), client, config);
        tokio::spawn(retrieval.run());
        tokio::spawn(generation.run());

        let intake = Intake::new(broker.clone(), config);
        let record = intake.ask(&self.question, self.k).await?;

        match record.status {
            RequestStatus::Completed => {
                println!("{}", record.answer);
                tracing::info!("Answered in {:.2}s", record.elapsed_seconds);
                Ok(())
            }
            _ => Err(AppError::Upstream(
                record
                    .error
                    .unwrap_or_else(|| "Request failed without detail".to_string()),
            )),
        }
    }
}
