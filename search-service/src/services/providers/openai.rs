//! OpenAI-compatible provider implementation.
//!
//! Streams chat completions over SSE and fetches embeddings. Every call is
//! authenticated with the caller's own key.

use super::sse::SseDecoder;
use super::{
    CallContext, CompletionProvider, CompletionStream, EmbeddingProvider, EmbeddingVector,
    ProviderError,
};
use crate::config::{CompletionConfig, OpenAiConfig};
use crate::services::relay::{spawn_relay, DecodeStep, StreamDecoder};
use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::observability::PropagateTrace;

/// Sentinel payload ending a chat completion stream.
const DONE_MARKER: &str = "[DONE]";

/// OpenAI provider for completions and embeddings.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_base: String,
    embedding_model: String,
    completion: CompletionConfig,
}

impl OpenAiProvider {
    pub fn new(client: Client, openai: &OpenAiConfig, completion: &CompletionConfig) -> Self {
        Self {
            client,
            api_base: openai.api_base.clone(),
            embedding_model: openai.embedding_model.clone(),
            completion: completion.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        ctx: CallContext<'_>,
        path: &str,
        body: &T,
    ) -> Result<Response, ProviderError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(ctx.api_key.expose_secret())
            .json(body)
            .propagate_trace(ctx.request_id)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                kind: error_kind(&body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream_completion(
        &self,
        ctx: CallContext<'_>,
        prompt: &str,
    ) -> Result<CompletionStream, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.completion.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.completion.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.completion.max_tokens,
            temperature: self.completion.temperature,
            stream: true,
        };

        tracing::debug!(
            model = %self.completion.model,
            prompt_len = prompt.len(),
            "Starting streaming completion request"
        );

        let response = self.post(ctx, "chat/completions", &request).await?;

        Ok(spawn_relay(
            response.bytes_stream(),
            ChatDeltaDecoder::default(),
            self.completion.relay_buffer_chunks,
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(
        &self,
        ctx: CallContext<'_>,
        input: &str,
    ) -> Result<EmbeddingVector, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input,
        };

        tracing::debug!(
            model = %self.embedding_model,
            input_len = input.len(),
            "Requesting embedding"
        );

        let response = self.post(ctx, "embeddings", &request).await?;

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("embedding response: {}", e)))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::MalformedResponse("no embedding in response".to_string()))
    }
}

/// Short identifier for a provider error body.
///
/// Error messages can echo the caller's key, so only `error.type` and
/// `error.code` are kept.
fn error_kind(body: &str) -> String {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return format!("unparseable body ({} bytes)", body.len());
    };

    let kind = [envelope.error.r#type, envelope.error.code]
        .into_iter()
        .flatten()
        .filter(|part| is_identifier(part))
        .collect::<Vec<_>>()
        .join("/");

    if kind.is_empty() {
        "unspecified".to_string()
    } else {
        kind
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Extracts `choices[0].delta.content` from chat completion SSE events.
#[derive(Debug, Default)]
pub struct ChatDeltaDecoder {
    sse: SseDecoder,
}

impl ChatDeltaDecoder {
    fn collect(events: impl IntoIterator<Item = super::sse::SseEvent>) -> DecodeStep {
        let mut step = DecodeStep::default();

        for event in events {
            if event.data.trim() == DONE_MARKER {
                step.done = true;
                break;
            }

            match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                Ok(chunk) => {
                    let text = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .filter(|text| !text.is_empty());
                    if let Some(text) = text {
                        step.chunks.push(text);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unparseable completion event");
                }
            }
        }

        step
    }
}

impl StreamDecoder for ChatDeltaDecoder {
    fn decode(&mut self, bytes: &[u8]) -> DecodeStep {
        Self::collect(self.sse.push(bytes))
    }

    fn finish(&mut self) -> DecodeStep {
        Self::collect(self.sse.finish())
    }
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default, deserialize_with = "code_as_string")]
    code: Option<String>,
}

// `code` is a string on most errors and a number on some.
fn code_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(code)) => Some(code),
        Some(serde_json::Value::Number(code)) => Some(code.to_string()),
        _ => None,
    })
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: EmbeddingVector,
}
