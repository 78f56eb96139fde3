//! Streaming response pipeline
//!
//! Turns one long-lived HTTP response body into an ordered, cancellable
//! sequence of typed events with a single terminal outcome.

pub mod decoder;
pub(crate) mod session;
pub mod sink;

// Re-export commonly used types
pub use decoder::{RawRecord, RecordDecoder, RecordFraming, MAX_BUFFER_SIZE};
pub use sink::{AbortHandle, ResponseStream, StreamOutcome};
