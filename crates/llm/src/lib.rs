//! Answer generation for the ragline pipeline.
//!
//! Provides a provider-agnostic client abstraction for text generation and
//! the prompt template that grounds an answer in retrieved contexts.
//!
//! # Example
//! ```no_run
//! use ragline_llm::{prompt, LlmClient, LlmRequest, OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new("http://localhost:11434");
//! let contexts = vec!["Docker is a container platform".to_string()];
//! let request = LlmRequest::new(prompt::build_prompt("What is Docker?", &contexts), "mistral");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod prompt;
pub mod providers;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse};
pub use factory::create_client;
pub use providers::OllamaClient;
