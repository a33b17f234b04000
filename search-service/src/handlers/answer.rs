use crate::error::ServiceError;
use crate::models::CompletionRequest;
use crate::services::CallContext;
use crate::startup::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use service_core::observability::extract_request_id;
use validator::Validate;

/// Stream a completion for the caller's prompt.
///
/// The body is read as raw bytes so malformed JSON and oversized bodies go
/// through the same opaque failure path as every other error.
pub async fn answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ServiceError> {
    let body = body?;
    let request: CompletionRequest = serde_json::from_slice(&body)?;
    request.validate()?;

    let request_id = extract_request_id(&headers);
    let ctx = CallContext {
        api_key: &request.api_key,
        request_id: request_id.as_deref(),
    };

    let stream = state
        .completion_provider
        .stream_completion(ctx, &request.prompt)
        .await?;

    tracing::info!(prompt_len = request.prompt.len(), "Relaying completion stream");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
