//! Upstream-to-client streaming relay.
//!
//! A spawned producer reads the upstream body, decodes it and pushes chunks
//! into a bounded channel whose receiving end becomes the response body. A
//! full channel suspends the producer until the client catches up. When the
//! client goes away the receiver is dropped and the producer stops, dropping
//! the upstream connection with it.

use super::providers::{CompletionStream, ProviderError};
use axum::body::Bytes;
use futures::StreamExt;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream};

/// Output of one decoding step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecodeStep {
    /// Chunks ready to forward, in arrival order.
    pub chunks: Vec<String>,
    /// Upstream signalled end of stream.
    pub done: bool,
}

/// Turns raw upstream bytes into client-facing chunks.
pub trait StreamDecoder: Send + 'static {
    fn decode(&mut self, bytes: &[u8]) -> DecodeStep;

    /// Called once when the upstream body ends without signalling `done`.
    fn finish(&mut self) -> DecodeStep {
        DecodeStep::default()
    }
}

/// Spawn a relay task and return the client-facing stream.
///
/// `capacity` bounds the number of decoded chunks buffered between the
/// upstream reader and the client.
pub fn spawn_relay<S, E, D>(upstream: S, mut decoder: D, capacity: usize) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    D: StreamDecoder,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let mut upstream = Box::pin(upstream);
        let mut forwarded = 0usize;

        loop {
            let next = tokio::select! {
                next = upstream.next() => next,
                _ = tx.closed() => {
                    tracing::debug!(forwarded, "Client disconnected, stopping relay");
                    return;
                }
            };

            let step = match next {
                Some(Ok(bytes)) => decoder.decode(&bytes),
                Some(Err(e)) => {
                    tracing::error!(error = %e, forwarded, "Upstream stream failed mid-relay");
                    let _ = tx
                        .send(Err(ProviderError::NetworkError(e.to_string())))
                        .await;
                    return;
                }
                None => {
                    let mut step = decoder.finish();
                    step.done = true;
                    step
                }
            };

            for chunk in step.chunks {
                if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
                    tracing::debug!(forwarded, "Client disconnected, stopping relay");
                    return;
                }
                forwarded += 1;
                counter!("search_service_relay_chunks_total").increment(1);
            }

            if step.done {
                tracing::debug!(forwarded, "Relay completed");
                return;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
