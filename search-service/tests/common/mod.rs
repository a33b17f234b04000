//! Test helpers for search-service integration tests.
//!
//! Upstreams are stubbed with wiremock; requests are driven through the
//! router in-process.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use search_service::config::{
    CompletionConfig, OpenAiConfig, SearchConfig, SearchServiceConfig, SupabaseConfig,
    DEFAULT_SYSTEM_PROMPT,
};
use search_service::{build_router, AppState};
use secrecy::Secret;
use serde_json::json;
use tower::util::ServiceExt;
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "sk-test-key";
pub const TEST_SERVICE_KEY: &str = "service-role-test-key";

/// Router wired to stub provider and database servers.
pub struct TestApp {
    pub router: Router,
    pub provider: MockServer,
    pub database: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let provider = MockServer::start().await;
        let database = MockServer::start().await;

        let config = test_config(&provider.uri(), &database.uri());
        let state = AppState::from_config(&config).expect("Failed to build app state");

        Self {
            router: build_router(state),
            provider,
            database,
        }
    }

    pub async fn post_json(&self, uri: &str, body: impl Into<String>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.into()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

pub fn test_config(provider_uri: &str, database_uri: &str) -> SearchServiceConfig {
    SearchServiceConfig {
        common: service_core::config::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        log_level: "error".to_string(),
        otlp_endpoint: None,
        openai: OpenAiConfig {
            api_base: provider_uri.to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            connect_timeout_secs: 5,
        },
        completion: CompletionConfig {
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 150,
            temperature: 0.0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            relay_buffer_chunks: 4,
        },
        supabase: SupabaseConfig {
            url: database_uri.to_string(),
            service_role_key: Secret::new(TEST_SERVICE_KEY.to_string()),
        },
        search: SearchConfig {
            function: "pg_search".to_string(),
            similarity_threshold: 0.01,
        },
    }
}

/// Drain a response body into a string.
pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

/// One chat-completion SSE event carrying `content`.
pub fn sse_delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        })
    )
}

/// A complete chat-completion SSE body for `deltas`, ending with `[DONE]`.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]})
    );
    for delta in deltas {
        body.push_str(&sse_delta(delta));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
