//! Language-model provider abstractions and implementations.
//!
//! Handlers depend on the traits so the provider backend can be swapped
//! (or stubbed) without touching request handling.

pub mod openai;
pub mod sse;

use crate::models::ApiKey;
use async_trait::async_trait;
use axum::body::Bytes;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    NetworkError(String),

    /// `kind` is the provider's error type or code, never the raw body.
    #[error("API error {status}: {kind}")]
    ApiError { status: u16, kind: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Embedding vector, kept as `f64` so values survive a JSON round trip.
pub type EmbeddingVector = Vec<f64>;

/// Incrementally delivered completion text.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Per-request values forwarded with every provider call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Caller's own provider key, sent as the bearer token.
    pub api_key: &'a ApiKey,
    pub request_id: Option<&'a str>,
}

/// Trait for streaming text completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a completion stream for `prompt`.
    ///
    /// Errors are returned only for failures before the first byte; later
    /// failures surface as an `Err` item on the stream.
    async fn stream_completion(
        &self,
        ctx: CallContext<'_>,
        prompt: &str,
    ) -> Result<CompletionStream, ProviderError>;
}

/// Trait for text embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `input` and return the first vector of the response.
    async fn embed(&self, ctx: CallContext<'_>, input: &str)
        -> Result<EmbeddingVector, ProviderError>;
}
