//! Similarity search against the vector database.
//!
//! The database exposes stored procedures over its REST gateway
//! (`POST /rest/v1/rpc/<function>`), authenticated with a server-held
//! service-role key.

use crate::config::{SearchConfig, SupabaseConfig};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::observability::PropagateTrace;
use thiserror::Error;

/// Opaque result row, relayed to the caller untouched.
pub type SearchResultRow = serde_json::Value;

/// Arguments of the similarity-search procedure.
#[derive(Debug, Clone, Serialize)]
pub struct SearchArgs<'a> {
    pub query_embedding: &'a [f64],
    pub similarity_threshold: f64,
    pub match_count: u32,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Procedure {function} failed with status {status}: {message}")]
    RpcError {
        function: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Run the procedure and return its rows in the order received.
    async fn search(
        &self,
        args: &SearchArgs<'_>,
        request_id: Option<&str>,
    ) -> Result<Vec<SearchResultRow>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// PostgREST-style error body.
#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// REST gateway client for the vector database.
#[derive(Clone)]
pub struct SupabaseDb {
    client: Client,
    base_url: String,
    service_role_key: Secret<String>,
    function: String,
}

impl SupabaseDb {
    pub fn new(client: Client, supabase: &SupabaseConfig, search: &SearchConfig) -> Self {
        Self {
            client,
            base_url: supabase.url.clone(),
            service_role_key: supabase.service_role_key.clone(),
            function: search.function.clone(),
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.service_role_key.expose_secret();
        request.header("apikey", key).bearer_auth(key)
    }
}

#[async_trait]
impl SimilaritySearch for SupabaseDb {
    async fn search(
        &self,
        args: &SearchArgs<'_>,
        request_id: Option<&str>,
    ) -> Result<Vec<SearchResultRow>, StoreError> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, self.function);

        tracing::debug!(
            function = %self.function,
            dimensions = args.query_embedding.len(),
            match_count = args.match_count,
            "Calling similarity search procedure"
        );

        let response = self
            .authorized(self.client.post(&url))
            .json(args)
            .propagate_trace(request_id)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<RpcErrorBody>(&text) {
                Ok(body) => {
                    tracing::error!(
                        function = %self.function,
                        code = body.code.as_deref().unwrap_or("-"),
                        details = body.details.as_deref().unwrap_or("-"),
                        hint = body.hint.as_deref().unwrap_or("-"),
                        "Similarity search procedure returned an error"
                    );
                    body.message
                }
                Err(_) => text,
            };

            return Err(StoreError::RpcError {
                function: self.function.clone(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Vec<SearchResultRow>>()
            .await
            .map_err(|e| StoreError::MalformedResponse(format!("expected an array of rows: {}", e)))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let url = format!("{}/rest/v1/", self.base_url);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::RpcError {
                function: "health".to_string(),
                status: response.status().as_u16(),
                message: "database gateway unavailable".to_string(),
            })
        }
    }
}
