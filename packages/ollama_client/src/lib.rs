//! Ollama Client - streaming access to a local text-generation endpoint
//!
//! This crate knows how to talk to one inference provider and nothing else:
//! no sessions, no browsers, no HTTP server. Callers own conversational state
//! and feed the context buffer back in on every request.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use ollama_client::{GenerationConfig, IncrementalResult, OllamaClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! let client = OllamaClient::new();
//! let models = client.list_models("http://localhost:11434").await;
//!
//! let config = GenerationConfig {
//!     model: models[0].name.clone(),
//!     base_url: "http://localhost:11434".to_string(),
//!     path: "/api/generate".to_string(),
//!     system: "Be concise.".to_string(),
//! };
//!
//! let mut stream = client.generate(&config, "hello", &[], CancellationToken::new());
//! while let Some(result) = stream.next().await {
//!     print!("{}", result.response());
//!     if let IncrementalResult::Final(end) = result {
//!         println!("\ncontext: {} tokens", end.context.len());
//!     }
//! }
//! # }
//! ```

mod client;
mod error;
mod ndjson;
mod stream;
mod types;

pub use client::OllamaClient;
pub use error::ClientError;
pub use stream::GenerationStream;
pub use types::{
    FinalResult, GenerateOptions, GenerateRequest, GenerationConfig, IncrementalResult, Model,
    PartialResult, TEMPERATURE,
};
