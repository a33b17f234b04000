//! Request shapes for the public endpoints.

pub mod request;

pub use request::{normalize_query, ApiKey, CompletionRequest, SearchRequest};
