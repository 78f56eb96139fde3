//! Error types for the Ollama client
//!
//! Every failure surfaces through a single `OllamaError` enum. Streaming
//! sessions report theirs through the terminal `StreamOutcome` instead of a
//! `Result` return, so callers have one uniform failure path whether an error
//! happens before or during a stream.

use thiserror::Error;

/// Main error type for all client operations
#[derive(Error, Debug)]
pub enum OllamaError {
    /// Request rejected before any network I/O (e.g. missing model name)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection-level failure from the HTTP transport
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status returned by the server
    #[error("server returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Streaming response declared a content type the client cannot frame
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// A stream record could not be parsed into the expected shape
    #[error("failed to decode record {index}: {message}")]
    Decode {
        /// Zero-based position of the record in the stream
        index: usize,
        message: String,
        /// The offending record bytes, lossily decoded for inspection
        record: String,
    },

    /// Internal streaming pipeline fault
    #[error("stream error: {0}")]
    Stream(String),

    /// The call was cancelled by the caller or a deadline
    #[error("cancelled")]
    Cancelled,
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, OllamaError>;
