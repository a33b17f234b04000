use crate::error::ServiceError;
use crate::models::SearchRequest;
use crate::services::{CallContext, SearchArgs};
use crate::startup::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use service_core::observability::extract_request_id;
use validator::Validate;

/// Embed the query and return the rows of the similarity-search procedure.
///
/// Rows are relayed exactly as the database returned them.
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ServiceError> {
    let body = body?;
    let request: SearchRequest = serde_json::from_slice(&body)?;
    request.validate()?;

    let request_id = extract_request_id(&headers);
    let input = request.normalized_query();
    let ctx = CallContext {
        api_key: &request.api_key,
        request_id: request_id.as_deref(),
    };

    let embedding = state.embedding_provider.embed(ctx, &input).await?;

    let args = SearchArgs {
        query_embedding: &embedding,
        similarity_threshold: state.similarity_threshold,
        match_count: request.matches,
    };
    let rows = state
        .search_store
        .search(&args, request_id.as_deref())
        .await?;

    tracing::info!(
        match_count = request.matches,
        rows = rows.len(),
        "Similarity search completed"
    );

    Ok((StatusCode::OK, Json(rows)).into_response())
}
