//! Hybrid retrieval and answer generation
//!
//! Dense (vector store) and sparse (BM25) signals run side by side; their
//! ranked lists are fused with Reciprocal Rank Fusion, optionally re-ranked,
//! and fed into the completion provider behind frequency- and quality-gated
//! caches.

mod engine;
mod fusion;
mod reranker;

pub use engine::{EngineSettings, QueryResult, RagEngine, SearchError, SourceChunk};
pub use fusion::{FusedResult, FusionEngine, FusionError};
pub use reranker::{RerankBackend, RerankDocument, RerankError, RerankResult, Reranker};

use serde::{Deserialize, Serialize};

/// Generic search hit from either retrieval signal
///
/// `score` is the originating system's native relevance metric: unbounded
/// BM25 weight for sparse hits, bounded similarity for dense hits. Scores
/// from different signals are never compared directly; fusion is rank-based
/// or normalizes first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f64,
}
