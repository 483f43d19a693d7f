//! The originating side of the protocol.

use std::sync::Arc;
use std::time::Duration;

use ragline_bus::{Broker, QuestionEnvelope, ResponseRecord};
use ragline_core::{AppConfig, AppResult};

use crate::topics;

/// Publishes questions and waits for their answers.
pub struct Intake {
    broker: Arc<Broker>,
    default_k: usize,
    request_ttl: Duration,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl Intake {
    pub fn new(broker: Arc<Broker>, config: &AppConfig) -> Self {
        Self {
            broker,
            default_k: config.top_k,
            request_ttl: config.request_ttl(),
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts,
        }
    }

    /// Submit a question under a fresh correlation id and poll for the
    /// terminal record.
    ///
    /// Returns `AppError::Timeout` when the poll budget runs out; the
    /// request may still complete downstream, but nobody will read it.
    pub async fn ask(&self, question: &str, k: Option<usize>) -> AppResult<ResponseRecord> {
        let envelope = QuestionEnvelope::new(question, k.unwrap_or(self.default_k));
        let id = envelope.id;

        self.broker.store_request(&envelope, self.request_ttl);
        let receivers = self.broker.publish(topics::QUESTIONS, &envelope)?;
        if receivers == 0 {
            tracing::warn!(
                "No subscriber on '{}'; request {} is lost and will time out",
                topics::QUESTIONS,
                id
            );
        }

        tracing::info!("Submitted question {} (k={})", id, envelope.k);

        self.broker
            .poll_response(id, self.poll_interval, self.max_poll_attempts)
            .await
    }
}
