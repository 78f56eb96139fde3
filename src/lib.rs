//! Async Rust client for the Ollama HTTP API
//!
//! Issues generation, chat, embedding, and model-management requests against
//! a local or remote Ollama server. Streaming endpoints deliver their
//! responses as an ordered, cancellable sequence of typed events with a
//! single terminal outcome.
//!
//! # Example
//!
//! ```no_run
//! use ollama_client::{GenerateRequest, OllamaClient};
//!
//! # async fn run() -> ollama_client::Result<()> {
//! let client = OllamaClient::new()?;
//!
//! let mut stream = client.generate_stream(GenerateRequest {
//!     model: "llama3.2:latest".to_string(),
//!     prompt: "Why is the sky blue?".to_string(),
//!     ..Default::default()
//! });
//!
//! while let Some(event) = stream.recv().await {
//!     print!("{}", event.response);
//! }
//! stream.finish().await.into_result()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod errors;
pub mod host;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use client::{ClientBuilder, OllamaClient};
pub use errors::{OllamaError, Result};
pub use streaming::{AbortHandle, ResponseStream, StreamOutcome};
pub use types::*;
