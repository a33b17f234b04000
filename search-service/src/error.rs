use crate::services::{ProviderError, StoreError};
use axum::{
    extract::rejection::BytesRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::counter;
use thiserror::Error;

/// Body of every failed response.
pub const FAILURE_BODY: &str = "Error";

/// Request-level failure.
///
/// The kinds exist for logs and metrics only. Callers always receive the
/// same plain-text `500 Error`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Provider failure: {0}")]
    Provider(#[from] ProviderError),

    #[error("Database failure: {0}")]
    Storage(#[from] StoreError),
}

impl ServiceError {
    /// Stage label used in logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            ServiceError::BadInput(_) => "request",
            ServiceError::Provider(_) => "provider",
            ServiceError::Storage(_) => "database",
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::BadInput(err.to_string())
    }
}

impl From<BytesRejection> for ServiceError {
    fn from(err: BytesRejection) -> Self {
        ServiceError::BadInput(err.body_text())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::BadInput(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let stage = self.stage();
        tracing::error!(stage, error = %self, "Request failed");
        counter!("search_service_failures_total", "stage" => stage).increment(1);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            FAILURE_BODY,
        )
            .into_response()
    }
}
