//! HTTP handlers for the search service.

pub mod answer;
pub mod health;
pub mod search;

pub use answer::answer;
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use search::search;
