//! Collaborator capabilities consumed by the retrieval engine
//!
//! Embedding generation, vector search, and answer completion are external
//! services; the engine only depends on these traits. Reference HTTP
//! implementations live in `openai` and `qdrant`. No trait implementation
//! retries: retries, if desired, belong to the HTTP client layer, and every
//! request carries a timeout so no call blocks indefinitely.

mod openai;
mod qdrant;

pub use openai::{OpenAiChatClient, OpenAiEmbeddingsClient};
pub use qdrant::QdrantStore;

use crate::retrieval::SearchHit;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch for id {id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    BadResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Request(e.to_string())
    }
}

/// Embedding generation capability
///
/// Assumed deterministic per input text; the embedding cache relies on this.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    fn model_name(&self) -> &str;
}

/// Text completion capability
///
/// Used for answer generation and, optionally, LLM-scored reranking.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ProviderError>;
}

/// A chunk vector with the payload the engine needs back at query time
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub categories: Vec<String>,
}

/// Dense vector store capability
///
/// The engine consumes ranked ids/scores/text only; store internals are the
/// owning service's concern.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_batch(&self, points: Vec<VectorPoint>) -> Result<(), ProviderError>;

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        category_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, ProviderError>;

    async fn delete_by_document(&self, document_id: &str) -> Result<(), ProviderError>;
}
