//! Caller-facing delivery for streaming responses
//!
//! A [`ResponseStream`] hands typed events to the caller in arrival order
//! over a bounded channel and reports exactly one terminal outcome once the
//! sequence ends. The producing session blocks until each event is consumed,
//! so a slow caller never causes unbounded buffering.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::errors::{OllamaError, Result};

/// Events are handed over one at a time; the producer waits for the caller.
pub(crate) const EVENT_BUFFER: usize = 1;

/// Terminal state of a streaming session
#[derive(Debug)]
pub enum StreamOutcome {
    /// The stream ended normally: a done event arrived, or the body finished.
    ///
    /// A body that ends without an explicit done event also completes
    /// normally, matching the server's behavior of closing the connection
    /// after the last record. A transport-level disconnect that cleanly
    /// closes the socket is indistinguishable from this.
    Completed,
    /// The stream aborted; events delivered before the failure stand.
    Failed(OllamaError),
    /// The caller or a deadline cancelled the stream.
    Cancelled,
}

impl StreamOutcome {
    /// True for normal completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Convert into a `Result`, mapping cancellation to
    /// [`OllamaError::Cancelled`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Completed => Ok(()),
            Self::Failed(err) => Err(err),
            Self::Cancelled => Err(OllamaError::Cancelled),
        }
    }
}

/// Handle used to cancel an in-flight streaming session.
///
/// Cancellation is cooperative: the session observes it at its next decode
/// or publish step, drops the response body, and reports
/// [`StreamOutcome::Cancelled`]. A deadline can be enforced by firing this
/// handle from a timer task.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Request cancellation. Safe to call more than once.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Channel endpoints held by the producing session task
pub(crate) struct SessionChannels<T> {
    pub events: mpsc::Sender<T>,
    pub outcome: oneshot::Sender<StreamOutcome>,
    pub abort: watch::Receiver<bool>,
}

/// Ordered, cancellable sequence of streamed events plus one terminal outcome
///
/// Dropping the stream (or calling [`finish`](Self::finish) before the
/// events are drained) cancels the underlying session.
pub struct ResponseStream<T> {
    events: mpsc::Receiver<T>,
    outcome: oneshot::Receiver<StreamOutcome>,
    abort: AbortHandle,
}

/// Create the paired endpoints for one streaming session.
pub(crate) fn session_channel<T>() -> (SessionChannels<T>, ResponseStream<T>) {
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let (abort_tx, abort_rx) = watch::channel(false);

    (
        SessionChannels {
            events: event_tx,
            outcome: outcome_tx,
            abort: abort_rx,
        },
        ResponseStream {
            events: event_rx,
            outcome: outcome_rx,
            abort: AbortHandle { tx: abort_tx },
        },
    )
}

impl<T> ResponseStream<T> {
    /// Receive the next event, in arrival order.
    ///
    /// Returns `None` once the sequence has ended; the terminal outcome is
    /// then available from [`finish`](Self::finish).
    pub async fn recv(&mut self) -> Option<T> {
        self.events.recv().await
    }

    /// Cancel the stream.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Handle for cancelling this stream from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Wait for the terminal outcome.
    ///
    /// Exactly one outcome is reported per stream. Events not yet received
    /// are dropped, which the session observes as cancellation.
    pub async fn finish(self) -> StreamOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => StreamOutcome::Failed(OllamaError::Stream(
                "session ended without reporting an outcome".to_string(),
            )),
        }
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}
