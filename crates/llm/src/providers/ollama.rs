//! Ollama generation provider.
//!
//! Single-shot completions against the local Ollama runtime
//! (`/api/generate`). Streaming is deliberately not used; the generation
//! stage writes one terminal record per request.

use crate::client::{LlmClient, LlmRequest, LlmResponse};
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GENERATE_ENDPOINT: &str = "/api/generate";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

/// Decoding options passed through to the runtime.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
}

/// Ollama generation client.
#[derive(Debug)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client against `base_url` (e.g., `http://localhost:11434`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }

    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
                stop: request.stop.clone(),
            },
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!("Sending completion request to Ollama ({})", request.model);

        let url = format!("{}{}", self.base_url, GENERATE_ENDPOINT);
        let payload = self.to_ollama_request(request);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Upstream(format!(
                "Ollama generate API error ({}): {}",
                status, body
            )));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(LlmResponse {
            content: parsed.response.trim().to_string(),
            model: parsed.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_normalizes_base_url() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_request_conversion() {
        let client = OllamaClient::new("http://localhost:11434");
        let request = LlmRequest::new("Hello", "mistral")
            .with_temperature(0.7)
            .with_max_tokens(100)
            .with_stop(&["</s>"]);

        let converted = client.to_ollama_request(&request);
        assert_eq!(converted.model, "mistral");
        assert_eq!(converted.prompt, "Hello");
        assert!(!converted.stream);
        assert_eq!(converted.options.temperature, Some(0.7));
        assert_eq!(converted.options.num_predict, Some(100));
        assert_eq!(converted.options.stop, vec!["</s>".to_string()]);
    }
}
