//! Application startup and lifecycle management.

use crate::config::SearchServiceConfig;
use crate::handlers::{answer, health_check, metrics_endpoint, readiness_check, search};
use crate::services::{
    CompletionProvider, EmbeddingProvider, OpenAiProvider, SimilaritySearch, SupabaseDb,
};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, request_id::request_id_middleware,
    security_headers::security_headers_middleware,
};
use service_core::observability::{init_metrics, REQUEST_ID_HEADER};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
///
/// Everything in here is immutable; requests share nothing else.
#[derive(Clone)]
pub struct AppState {
    pub completion_provider: Arc<dyn CompletionProvider>,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
    pub search_store: Arc<dyn SimilaritySearch>,
    pub similarity_threshold: f64,
}

impl AppState {
    /// Wire the production backends from configuration.
    pub fn from_config(config: &SearchServiceConfig) -> Result<Self, AppError> {
        let client = build_http_client(config.openai.connect_timeout_secs)?;

        let provider = Arc::new(OpenAiProvider::new(
            client.clone(),
            &config.openai,
            &config.completion,
        ));
        let store = Arc::new(SupabaseDb::new(client, &config.supabase, &config.search));

        Ok(Self {
            completion_provider: provider.clone(),
            embedding_provider: provider,
            search_store: store,
            similarity_threshold: config.search.similarity_threshold,
        })
    }
}

/// Shared outbound client.
///
/// Only connecting is bounded; a total timeout would cut long completions off.
pub fn build_http_client(connect_timeout_secs: u64) -> Result<reqwest::Client, AppError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .build()?)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/answer", post(answer))
        .route("/api/search", post(search))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .route_layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: SearchServiceConfig) -> Result<Self, AppError> {
        init_metrics()?;

        let state = AppState::from_config(&config)?;

        tracing::info!(
            completion_model = %config.completion.model,
            embedding_model = %config.openai.embedding_model,
            search_function = %config.search.function,
            "Initialized upstream clients"
        );

        let address = config.common.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            e
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT/SIGTERM.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!("HTTP server listening on port {}", self.port);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                e
            })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
