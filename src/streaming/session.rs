//! Streaming session lifecycle
//!
//! One spawned task per streaming call owns the request, the response body,
//! and the record decoder. It publishes typed events to the caller in
//! arrival order and reports exactly one terminal outcome on every exit
//! path: normal completion, failure, or cancellation. The body is owned by
//! the task and dropped exactly once, whichever way the session ends.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::client::api_error;
use crate::errors::OllamaError;
use crate::streaming::decoder::{RawRecord, RecordDecoder, RecordFraming};
use crate::streaming::sink::{session_channel, ResponseStream, StreamOutcome};
use crate::types::StreamEvent;

/// Spawn a session for an already-validated streaming request.
pub(crate) fn spawn<T>(request: RequestBuilder) -> ResponseStream<T>
where
    T: DeserializeOwned + StreamEvent + Send + 'static,
{
    let (channels, stream) = session_channel();
    tokio::spawn(run(
        request,
        channels.events,
        channels.outcome,
        channels.abort,
    ));
    stream
}

/// Report a request rejected before any network I/O.
///
/// Validation failures travel through the same terminal signal as streaming
/// failures, so callers have a single failure path.
pub(crate) fn reject<T>(error: OllamaError) -> ResponseStream<T> {
    let (channels, stream) = session_channel();
    let _ = channels.outcome.send(StreamOutcome::Failed(error));
    stream
}

async fn run<T>(
    request: RequestBuilder,
    events: mpsc::Sender<T>,
    outcome_tx: oneshot::Sender<StreamOutcome>,
    mut abort: watch::Receiver<bool>,
) where
    T: DeserializeOwned + StreamEvent + Send + 'static,
{
    let outcome = drive(request, &events, &mut abort).await;
    match &outcome {
        StreamOutcome::Completed => debug!("stream session completed"),
        StreamOutcome::Failed(err) => debug!(error = %err, "stream session failed"),
        StreamOutcome::Cancelled => debug!("stream session cancelled"),
    }
    let _ = outcome_tx.send(outcome);
}

/// Issue the request, validate the response head, and pump the body.
async fn drive<T>(
    request: RequestBuilder,
    events: &mpsc::Sender<T>,
    abort: &mut watch::Receiver<bool>,
) -> StreamOutcome
where
    T: DeserializeOwned + StreamEvent,
{
    let response = tokio::select! {
        biased;
        _ = cancelled(abort) => return StreamOutcome::Cancelled,
        result = request.send() => match result {
            Ok(response) => response,
            Err(err) => return StreamOutcome::Failed(err.into()),
        },
    };

    if !response.status().is_success() {
        return StreamOutcome::Failed(api_error(response).await);
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let framing = match RecordFraming::from_content_type(&content_type) {
        Some(framing) => framing,
        None => return StreamOutcome::Failed(OllamaError::UnexpectedContentType(content_type)),
    };

    debug!(status = %response.status(), ?framing, "stream session started");

    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(OllamaError::from));
    pump(body, framing, events, abort).await
}

/// Decode the body record by record and publish each typed event in order.
///
/// Cancellation is checked at every decode and publish step. Publishing
/// blocks on the bounded event channel until the caller consumes the event,
/// so the session never reads ahead of the caller by more than one record.
pub(crate) async fn pump<T, S>(
    body: S,
    framing: RecordFraming,
    events: &mpsc::Sender<T>,
    abort: &mut watch::Receiver<bool>,
) -> StreamOutcome
where
    T: DeserializeOwned + StreamEvent,
    S: Stream<Item = Result<Bytes, OllamaError>>,
{
    futures_util::pin_mut!(body);
    let mut decoder = RecordDecoder::new(framing);

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancelled(abort) => return StreamOutcome::Cancelled,
            chunk = body.next() => chunk,
        };

        match chunk {
            None => {
                // End of body: an unterminated tail is still one last
                // record, and finishing without a done event is normal
                // completion.
                if let Some(record) = decoder.finish() {
                    match publish(record, events, abort).await {
                        Publish::Sent { .. } => {}
                        Publish::Cancelled => return StreamOutcome::Cancelled,
                        Publish::Failed(err) => return StreamOutcome::Failed(err),
                    }
                }
                return StreamOutcome::Completed;
            }
            Some(Err(err)) => return StreamOutcome::Failed(err),
            Some(Ok(bytes)) => {
                let records = match decoder.push(&bytes) {
                    Ok(records) => records,
                    Err(err) => return StreamOutcome::Failed(err),
                };
                for record in records {
                    match publish(record, events, abort).await {
                        Publish::Sent { done: false } => {}
                        Publish::Sent { done: true } => return StreamOutcome::Completed,
                        Publish::Cancelled => return StreamOutcome::Cancelled,
                        Publish::Failed(err) => return StreamOutcome::Failed(err),
                    }
                }
            }
        }
    }
}

enum Publish {
    Sent { done: bool },
    Cancelled,
    Failed(OllamaError),
}

/// Map one raw record to its typed event and hand it to the caller.
async fn publish<T>(
    record: RawRecord,
    events: &mpsc::Sender<T>,
    abort: &mut watch::Receiver<bool>,
) -> Publish
where
    T: DeserializeOwned + StreamEvent,
{
    let event: T = match serde_json::from_slice(&record.payload) {
        Ok(event) => event,
        Err(err) => {
            return Publish::Failed(OllamaError::Decode {
                index: record.index,
                message: err.to_string(),
                record: String::from_utf8_lossy(&record.payload).into_owned(),
            })
        }
    };

    let done = event.is_done();
    tokio::select! {
        biased;
        _ = cancelled(abort) => Publish::Cancelled,
        sent = events.send(event) => {
            if sent.is_err() {
                // Receiver dropped: the caller walked away mid-stream.
                warn!("event receiver dropped before the stream finished");
                Publish::Cancelled
            } else {
                Publish::Sent { done }
            }
        }
    }
}

/// Resolve once cancellation is requested.
///
/// A dropped [`ResponseStream`](crate::streaming::ResponseStream) closes the
/// watch channel, which counts as cancellation too.
async fn cancelled(abort: &mut watch::Receiver<bool>) {
    if *abort.borrow() {
        return;
    }
    loop {
        if abort.changed().await.is_err() {
            return;
        }
        if *abort.borrow() {
            return;
        }
    }
}
