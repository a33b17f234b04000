use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, Environment};
use service_core::error::AppError;

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_SEARCH_FUNCTION: &str = "pg_search";
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.01;
const DEFAULT_MAX_TOKENS: u32 = 150;
const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_RELAY_BUFFER_CHUNKS: usize = 32;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that accurately answers \
queries using the provided passages. Use the text provided to form your answer, but avoid \
copying word-for-word. Try to use your own words when possible. Keep your answer under 5 \
sentences. Be accurate, helpful, concise, and clear.";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchServiceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub openai: OpenAiConfig,
    pub completion: CompletionConfig,
    pub supabase: SupabaseConfig,
    pub search: SearchConfig,
}

/// Language-model provider endpoints. The API key is supplied per request.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub embedding_model: String,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
    /// Capacity of the relay channel between upstream reader and response body.
    pub relay_buffer_chunks: usize,
}

/// Server-held credentials for the vector database's REST gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub function: String,
    pub similarity_threshold: f64,
}

impl SearchServiceConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let env = Environment::current();

        let relay_buffer_chunks =
            get_env_parsed("RELAY_BUFFER_CHUNKS", DEFAULT_RELAY_BUFFER_CHUNKS, env)?;
        if relay_buffer_chunks == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RELAY_BUFFER_CHUNKS must be at least 1"
            )));
        }

        Ok(SearchServiceConfig {
            common,
            log_level: get_env("LOG_LEVEL", Some("info"), env)?,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
            openai: OpenAiConfig {
                api_base: get_env("OPENAI_API_BASE", Some(DEFAULT_OPENAI_API_BASE), env)?
                    .trim_end_matches('/')
                    .to_string(),
                embedding_model: get_env(
                    "OPENAI_EMBEDDING_MODEL",
                    Some(DEFAULT_EMBEDDING_MODEL),
                    env,
                )?,
                connect_timeout_secs: get_env_parsed(
                    "UPSTREAM_CONNECT_TIMEOUT_SECS",
                    DEFAULT_CONNECT_TIMEOUT_SECS,
                    env,
                )?,
            },
            completion: CompletionConfig {
                model: get_env(
                    "OPENAI_COMPLETION_MODEL",
                    Some(DEFAULT_COMPLETION_MODEL),
                    env,
                )?,
                max_tokens: get_env_parsed("COMPLETION_MAX_TOKENS", DEFAULT_MAX_TOKENS, env)?,
                temperature: get_env_parsed("COMPLETION_TEMPERATURE", DEFAULT_TEMPERATURE, env)?,
                system_prompt: get_env(
                    "COMPLETION_SYSTEM_PROMPT",
                    Some(DEFAULT_SYSTEM_PROMPT),
                    env,
                )?,
                relay_buffer_chunks,
            },
            supabase: SupabaseConfig {
                url: get_env("SUPABASE_URL", None, env)?
                    .trim_end_matches('/')
                    .to_string(),
                service_role_key: Secret::new(get_env("SUPABASE_SERVICE_ROLE_KEY", None, env)?),
            },
            search: SearchConfig {
                function: get_env("SEARCH_RPC_FUNCTION", Some(DEFAULT_SEARCH_FUNCTION), env)?,
                similarity_threshold: get_env_parsed(
                    "SEARCH_SIMILARITY_THRESHOLD",
                    DEFAULT_SIMILARITY_THRESHOLD,
                    env,
                )?,
            },
        })
    }
}
