pub mod database;
pub mod providers;
pub mod relay;

pub use database::{SearchArgs, SearchResultRow, SimilaritySearch, StoreError, SupabaseDb};
pub use providers::openai::OpenAiProvider;
pub use providers::{
    CallContext, CompletionProvider, EmbeddingProvider, EmbeddingVector, ProviderError,
};
