use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Caller-supplied provider API key.
///
/// Forwarded to the provider as a bearer token and never logged.
pub type ApiKey = Secret<String>;

/// Body of `POST /api/answer`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_completion_key"))]
pub struct CompletionRequest {
    #[validate(length(min = 1))]
    pub prompt: String,
    pub api_key: ApiKey,
}

/// Body of `POST /api/search`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_search_key"))]
pub struct SearchRequest {
    #[validate(length(min = 1))]
    pub query: String,
    pub api_key: ApiKey,
    #[validate(range(min = 1, max = 100))]
    pub matches: u32,
}

impl SearchRequest {
    /// Query text as sent to the embedding endpoint.
    pub fn normalized_query(&self) -> String {
        normalize_query(&self.query)
    }
}

/// Replace every newline with a single space. Nothing else is touched.
pub fn normalize_query(query: &str) -> String {
    query.replace('\n', " ")
}

// Struct-level so the key is checked through `expose_secret` and never
// handed to the derive, which would serialize it into the error params.
fn validate_completion_key(request: &CompletionRequest) -> Result<(), ValidationError> {
    validate_api_key(&request.api_key)
}

fn validate_search_key(request: &SearchRequest) -> Result<(), ValidationError> {
    validate_api_key(&request.api_key)
}

fn validate_api_key(key: &ApiKey) -> Result<(), ValidationError> {
    let key = key.expose_secret();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("api_key"));
    }
    Ok(())
}
