//! End-to-end protocol flows over an in-process bus.
//!
//! These tests run real stage loops as tasks and drive them through the
//! intake operation, with the deterministic trigram provider standing in
//! for the embedding model and an echoing stub for the generator. The
//! tokio clock is paused, so poll intervals cost no wall time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ragline_bus::{Broker, RequestStatus};
use ragline_core::{AppConfig, AppError, AppResult};
use ragline_llm::{LlmClient, LlmRequest, LlmResponse};
use ragline_retrieval::{create_provider, DocumentMetadata, MetadataStore, RetrievalService};
use uuid::Uuid;

use crate::{topics, GenerationStage, Intake, RetrievalStage};

/// Echoes the prompt back, so a test can tell which question an answer
/// belongs to.
#[derive(Debug)]
struct EchoGenerator;

#[async_trait::async_trait]
impl LlmClient for EchoGenerator {
    fn provider_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        Ok(LlmResponse {
            content: format!("echo:{}", request.prompt),
            model: request.model.clone(),
        })
    }
}

/// Always fails, standing in for an unreachable model runtime.
#[derive(Debug)]
struct FailingGenerator;

#[async_trait::async_trait]
impl LlmClient for FailingGenerator {
    fn provider_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        Err(AppError::Upstream("model runtime unreachable".to_string()))
    }
}

fn test_config(dir: &tempfile::TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.embed_dimensions = 64;
    config.index_path = dir.path().join("index.bin");
    config.meta_path = dir.path().join("meta.json");
    config.poll_interval_ms = 100;
    config.max_poll_attempts = 50;
    config
}

fn seed_documents(config: &AppConfig) {
    let mut mapping = BTreeMap::new();
    mapping.insert(
        0,
        DocumentMetadata::new("Docker is a container platform", "doc1"),
    );
    mapping.insert(1, DocumentMetadata::new("Rust is a systems language", "doc2"));
    MetadataStore::new(&config.meta_path).save(&mapping).unwrap();
}

async fn open_service(config: &AppConfig) -> RetrievalService {
    let provider = create_provider(config).unwrap();
    RetrievalService::open(config, provider, true).await.unwrap()
}

/// Construct (subscribing) and spawn both stages.
async fn spawn_stages(broker: &Arc<Broker>, config: &AppConfig, client: Arc<dyn LlmClient>) {
    let service = open_service(config).await;
    let retrieval = RetrievalStage::new(broker.clone(), service, config);
    let generation = GenerationStage::new(broker.clone(), client, config);
    tokio::spawn(retrieval.run());
    tokio::spawn(generation.run());
}

#[tokio::test(start_paused = true)]
async fn test_question_flows_to_completed_answer() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    seed_documents(&config);

    let broker = Arc::new(Broker::new(config.bus_capacity));
    spawn_stages(&broker, &config, Arc::new(EchoGenerator)).await;

    let intake = Intake::new(broker.clone(), &config);
    let record = intake.ask("What is Docker?", Some(1)).await.unwrap();

    assert_eq!(record.status, RequestStatus::Completed);
    assert_eq!(record.question, "What is Docker?");
    assert_eq!(record.contexts, vec!["Docker is a container platform".to_string()]);
    assert!(record.answer.contains("What is Docker?"));
    assert!(record.error.is_none());
    assert!(record.elapsed_seconds >= 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_contexts_resolves_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    let broker = Arc::new(Broker::new(config.bus_capacity));
    // Only the generation stage is running
    let generation = GenerationStage::new(broker.clone(), Arc::new(EchoGenerator), &config);
    tokio::spawn(generation.run());

    let id = Uuid::new_v4();
    broker
        .publish(
            topics::GENERATION,
            &serde_json::json!({ "id": id, "question": "X" }),
        )
        .unwrap();

    let record = broker
        .poll_response(id, Duration::from_millis(100), 50)
        .await
        .unwrap();

    assert_eq!(record.status, RequestStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("contexts"));
    assert_eq!(record.question, "X");
}

#[tokio::test(start_paused = true)]
async fn test_upstream_failure_becomes_failed_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    seed_documents(&config);

    let broker = Arc::new(Broker::new(config.bus_capacity));
    spawn_stages(&broker, &config, Arc::new(FailingGenerator)).await;

    let intake = Intake::new(broker.clone(), &config);
    let record = intake.ask("What is Docker?", None).await.unwrap();

    assert_eq!(record.status, RequestStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("unreachable"));
    assert_eq!(record.question, "What is Docker?");
}

#[tokio::test(start_paused = true)]
async fn test_lost_message_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.poll_interval_ms = 1000;
    config.max_poll_attempts = 3;

    // Nobody is subscribed, so the publish is lost
    let broker = Arc::new(Broker::new(config.bus_capacity));
    let intake = Intake::new(broker, &config);

    let err = intake.ask("X", Some(3)).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout { attempts: 3 }));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    seed_documents(&config);

    let broker = Arc::new(Broker::new(config.bus_capacity));
    spawn_stages(&broker, &config, Arc::new(EchoGenerator)).await;

    let intake = Intake::new(broker.clone(), &config);
    let (record_a, record_b) = tokio::join!(
        intake.ask("What is Docker?", Some(1)),
        intake.ask("What is Rust?", Some(1)),
    );
    let record_a = record_a.unwrap();
    let record_b = record_b.unwrap();

    assert_ne!(record_a.id, record_b.id);
    assert_eq!(record_a.question, "What is Docker?");
    assert_eq!(record_b.question, "What is Rust?");
    assert!(record_a.answer.contains("What is Docker?"));
    assert!(!record_a.answer.contains("What is Rust?"));
    assert!(record_b.answer.contains("What is Rust?"));
}

#[tokio::test(start_paused = true)]
async fn test_uncorrelatable_message_is_dropped_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    seed_documents(&config);

    let broker = Arc::new(Broker::new(config.bus_capacity));
    spawn_stages(&broker, &config, Arc::new(EchoGenerator)).await;

    // No id at all: nothing to answer, the stage logs and moves on
    broker
        .publish(topics::QUESTIONS, &serde_json::json!({ "question": "no id" }))
        .unwrap();

    // The loop is still alive and serves the next request
    let intake = Intake::new(broker.clone(), &config);
    let record = intake.ask("What is Docker?", Some(1)).await.unwrap();
    assert_eq!(record.status, RequestStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_empty_question_completes_with_no_contexts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    seed_documents(&config);

    let broker = Arc::new(Broker::new(config.bus_capacity));
    spawn_stages(&broker, &config, Arc::new(EchoGenerator)).await;

    let intake = Intake::new(broker.clone(), &config);
    let record = intake.ask("   ", Some(3)).await.unwrap();

    assert_eq!(record.status, RequestStatus::Completed);
    assert!(record.contexts.is_empty());
}
