//! Retrieval stage event loop.
//!
//! Subscribes to the questions topic, resolves contexts through the
//! retrieval service it exclusively owns, and republishes on the
//! generation topic. Processing is strictly sequential: one message is
//! fully handled, including the outbound publish, before the next is
//! pulled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ragline_bus::{Broker, GenerationEnvelope, ResponseRecord, Subscription};
use ragline_core::{AppConfig, AppError, AppResult};
use ragline_retrieval::RetrievalService;
use uuid::Uuid;

use crate::topics;

/// The retrieval stage. Construction subscribes immediately, so messages
/// published after the stage exists are never lost to a subscription race.
pub struct RetrievalStage {
    broker: Arc<Broker>,
    subscription: Subscription,
    service: RetrievalService,
    default_k: usize,
    response_ttl: Duration,
}

impl RetrievalStage {
    pub fn new(broker: Arc<Broker>, service: RetrievalService, config: &AppConfig) -> Self {
        let subscription = broker.subscribe(topics::QUESTIONS);
        tracing::info!("Retrieval stage subscribed to '{}'", topics::QUESTIONS);
        Self {
            broker,
            subscription,
            service,
            default_k: config.top_k,
            response_ttl: config.response_ttl(),
        }
    }

    /// Run until the bus closes.
    pub async fn run(mut self) {
        while let Some(payload) = self.subscription.next().await {
            if let Err(e) = self.process(&payload).await {
                // Only uncorrelatable payloads land here; everything with
                // an id was already answered with a failed record.
                tracing::warn!("Dropped message on '{}': {}", topics::QUESTIONS, e);
            }
        }
        tracing::info!("Retrieval stage stopped; bus closed");
    }

    /// Handle one message. Returns an error only when the payload cannot
    /// be correlated to a request id.
    async fn process(&mut self, payload: &str) -> AppResult<()> {
        let started = Instant::now();

        let value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| AppError::MalformedMessage(format!("Undecodable payload: {}", e)))?;

        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AppError::MalformedMessage("Payload has no usable 'id'".to_string()))?;

        let question = match value.get("question").and_then(|v| v.as_str()) {
            Some(question) => question.to_string(),
            None => {
                self.fail(id, "", AppError::MissingField("question".to_string()), started);
                return Ok(());
            }
        };

        let k = value
            .get("k")
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .unwrap_or(self.default_k);

        tracing::info!("Request {}: retrieving {} contexts", id, k);

        match self.service.get_contexts(&question, k).await {
            Ok(contexts) => {
                let envelope = GenerationEnvelope {
                    id,
                    question,
                    contexts,
                };
                self.broker.publish(topics::GENERATION, &envelope)?;
                tracing::debug!(
                    "Request {}: contexts published in {:.3}s",
                    id,
                    started.elapsed().as_secs_f64()
                );
            }
            Err(e) => self.fail(id, &question, e, started),
        }

        Ok(())
    }

    /// Answer a correlated failure so the poller terminates instead of
    /// timing out.
    fn fail(&self, id: Uuid, question: &str, error: AppError, started: Instant) {
        tracing::warn!("Request {} failed in retrieval: {}", id, error);
        let record = ResponseRecord::failed(
            id,
            question,
            error.to_string(),
            started.elapsed().as_secs_f64(),
        );
        self.broker.store_response(record, self.response_ttl);
    }
}
