//! Generation stage event loop.
//!
//! The terminal stage: subscribes to the generation topic, synthesizes an
//! answer grounded in the retrieved contexts, and writes the one response
//! record for the request id. Every correlated failure also ends in a
//! record, so pollers never wait out a timeout for a request that already
//! died here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ragline_bus::{Broker, ResponseRecord, Subscription};
use ragline_core::{AppConfig, AppError, AppResult};
use ragline_llm::{prompt, LlmClient, LlmRequest};
use uuid::Uuid;

use crate::topics;

/// The generation stage. Construction subscribes immediately.
pub struct GenerationStage {
    broker: Arc<Broker>,
    subscription: Subscription,
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    response_ttl: Duration,
}

impl GenerationStage {
    pub fn new(broker: Arc<Broker>, client: Arc<dyn LlmClient>, config: &AppConfig) -> Self {
        let subscription = broker.subscribe(topics::GENERATION);
        tracing::info!("Generation stage subscribed to '{}'", topics::GENERATION);
        Self {
            broker,
            subscription,
            client,
            model: config.gen_model.clone(),
            max_tokens: config.gen_max_tokens,
            temperature: config.gen_temperature,
            top_p: config.gen_top_p,
            response_ttl: config.response_ttl(),
        }
    }

    /// Run until the bus closes.
    pub async fn run(mut self) {
        while let Some(payload) = self.subscription.next().await {
            if let Err(e) = self.process(&payload).await {
                tracing::warn!("Dropped message on '{}': {}", topics::GENERATION, e);
            }
        }
        tracing::info!("Generation stage stopped; bus closed");
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

        let contexts: Vec<String> = match value
            .get("contexts")
            .map(|v| serde_json::from_value(v.clone()))
        {
            Some(Ok(contexts)) => contexts,
            _ => {
                self.fail(
                    id,
                    &question,
                    AppError::MissingField("contexts".to_string()),
                    started,
                );
                return Ok(());
            }
        };

        tracing::info!(
            "Request {}: generating from {} contexts for '{}'",
            id,
            contexts.len(),
            truncate(&question, 60)
        );

        let request = LlmRequest::new(prompt::build_prompt(&question, &contexts), &self.model)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_stop(prompt::STOP_TOKENS);

        match self.client.complete(&request).await {
            Ok(response) => {
                let elapsed = started.elapsed().as_secs_f64();
                let record =
                    ResponseRecord::completed(id, question, contexts, response.content, elapsed);
                self.broker.store_response(record, self.response_ttl);
                tracing::info!("Request {}: answer ready in {:.2}s", id, elapsed);
            }
            Err(e) => self.fail(id, &question, e, started),
        }

        Ok(())
    }

    fn fail(&self, id: Uuid, question: &str, error: AppError, started: Instant) {
        tracing::warn!("Request {} failed in generation: {}", id, error);
        let record = ResponseRecord::failed(
            id,
            question,
            error.to_string(),
            started.elapsed().as_secs_f64(),
        );
        self.broker.store_response(record, self.response_ttl);
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
