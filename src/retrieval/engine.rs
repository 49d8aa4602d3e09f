//! The retrieval engine: ingest, retrieve, answer, remove

use crate::cache::{
    cache_key, passes_quality_gate, AnswerCache, EmbeddingCache, FrequencyStats, FrequencyTracker,
};
use crate::chunk::Chunker;
use crate::config::Config;
use crate::index::{Bm25Hit, Bm25Index, IndexStats};
use crate::provider::{
    CompletionProvider, EmbeddingProvider, ProviderError, VectorPoint, VectorStore,
};
use crate::retrieval::{FusedResult, FusionEngine, RerankDocument, Reranker, SearchHit};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};

const NO_INFORMATION_ANSWER: &str =
    "I don't have information about that in the knowledge base.";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid input: {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("Vector upsert failed: {0}")]
    VectorUpsert(String),

    #[error("Vector delete failed: {0}")]
    VectorDelete(String),

    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Fusion failed: {0}")]
    Fusion(#[from] crate::retrieval::FusionError),
}

/// A retrieved source attached to an answer
#[derive(Debug, Clone, Serialize)]
pub struct SourceChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub relevance_score: f64,
    pub text: String,
}

/// Answer with the sources that grounded it
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceChunk>,
}

/// Tunables resolved from configuration at construction time
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub top_k: usize,
    pub search_multiplier: usize,
    pub min_relevance_score: f64,
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub min_cacheable_score: f64,
    pub ingest_batch_size: usize,
    pub max_concurrent_embeddings: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            search_multiplier: config.retrieval.search_multiplier,
            min_relevance_score: config.retrieval.min_relevance_score,
            dense_weight: config.retrieval.dense_weight,
            sparse_weight: config.retrieval.sparse_weight,
            min_cacheable_score: config.cache.min_cacheable_score,
            ingest_batch_size: config.performance.ingest_batch_size,
            max_concurrent_embeddings: config.performance.max_concurrent_embeddings,
        }
    }
}

/// Process-wide hybrid retrieval engine
///
/// The BM25 index is the only shared mutable state; every mutation runs
/// under the write half of one coarse lock while searches share the read
/// half, so scoring never observes a half-applied update.
pub struct RagEngine {
    chunker: Chunker,
    bm25: Arc<RwLock<Bm25Index>>,
    fusion: FusionEngine,
    reranker: Reranker,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    completion: Arc<dyn CompletionProvider>,
    frequency: FrequencyTracker,
    answer_cache: AnswerCache<QueryResult>,
    embedding_cache: EmbeddingCache,
    embed_permits: Arc<Semaphore>,
    settings: EngineSettings,
}

impl RagEngine {
    pub fn new(
        chunker: Chunker,
        fusion: FusionEngine,
        reranker: Reranker,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        completion: Arc<dyn CompletionProvider>,
        question_threshold: u64,
        answer_cache_capacity: usize,
        embedding_cache_capacity: usize,
        settings: EngineSettings,
    ) -> Self {
        tracing::info!(
            "engine initialized: top_k={}, dense_weight={}, sparse_weight={}, reranker={}",
            settings.top_k,
            settings.dense_weight,
            settings.sparse_weight,
            reranker.is_enabled()
        );

        Self {
            chunker,
            bm25: Arc::new(RwLock::new(Bm25Index::new())),
            fusion,
            reranker,
            embedder,
            vector_store,
            completion,
            frequency: FrequencyTracker::new(question_threshold),
            answer_cache: AnswerCache::new(answer_cache_capacity),
            embedding_cache: EmbeddingCache::new(embedding_cache_capacity),
            embed_permits: Arc::new(Semaphore::new(settings.max_concurrent_embeddings.max(1))),
            settings,
        }
    }

    /// Chunk, embed, upsert and index a document
    ///
    /// Chunk ids derive from `(document_id, chunk_index, text)`, so
    /// re-ingesting identical content replaces rather than duplicates.
    /// Embedding calls are gated by a counting semaphore; vector points are
    /// flushed in batches.
    pub async fn ingest_document(
        &self,
        document_id: &str,
        text: &str,
        categories: &[String],
    ) -> Result<usize, SearchError> {
        if document_id.trim().is_empty() {
            return Err(SearchError::InvalidInput {
                field: "document_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if text.trim().is_empty() {
            return Err(SearchError::InvalidInput {
                field: "text".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let started = std::time::Instant::now();
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut batch: Vec<VectorPoint> = Vec::with_capacity(self.settings.ingest_batch_size);

        for (i, chunk) in chunks.iter().enumerate() {
            let _permit = self
                .embed_permits
                .acquire()
                .await
                .expect("semaphore closed");

            let vector = self
                .embedder
                .embed(chunk)
                .await
                .map_err(|e| SearchError::Embedding(e.to_string()))?;

            let chunk_id = stable_id(document_id, i, chunk);

            batch.push(VectorPoint {
                id: chunk_id.clone(),
                vector,
                document_id: document_id.to_string(),
                chunk_index: i,
                text: chunk.clone(),
                categories: categories.to_vec(),
            });
            if batch.len() >= self.settings.ingest_batch_size {
                self.flush_batch(&mut batch).await?;
            }

            self.bm25
                .write()
                .await
                .index(&chunk_id, document_id, i, chunk, categories);
        }

        self.flush_batch(&mut batch).await?;

        tracing::info!(
            "ingested document {}: {} chunks in {}ms",
            document_id,
            chunks.len(),
            started.elapsed().as_millis()
        );

        Ok(chunks.len())
    }

    async fn flush_batch(&self, batch: &mut Vec<VectorPoint>) -> Result<(), SearchError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.vector_store
            .upsert_batch(std::mem::take(batch))
            .await
            .map_err(|e| SearchError::VectorUpsert(e.to_string()))
    }

    /// Hybrid retrieval: both signals in parallel, fused with weighted RRF
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<FusedResult>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidInput {
                field: "query".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let fetch_k = top_k * self.settings.search_multiplier.max(1);

        let (dense, sparse) = tokio::join!(
            self.dense_search(query, fetch_k, category),
            self.sparse_search(query, fetch_k, category)
        );
        let dense = dense?;

        let fused = self.fusion.fuse_weighted(
            &dense,
            &sparse,
            self.settings.dense_weight,
            self.settings.sparse_weight,
            top_k,
        )?;

        tracing::debug!(
            "retrieve: dense={}, sparse={}, fused={}",
            dense.len(),
            sparse.len(),
            fused.len()
        );

        Ok(fused)
    }

    /// Answer a question over the indexed corpus
    ///
    /// The frequency gate runs first: below-threshold questions neither read
    /// nor write the answer cache. Above it, a hit short-circuits the whole
    /// pipeline; a miss runs retrieval (re-ranked when enabled), the
    /// relevance floor, completion, and quality-gated admission.
    pub async fn answer(
        &self,
        question: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<QueryResult, SearchError> {
        if question.trim().is_empty() {
            return Err(SearchError::InvalidInput {
                field: "question".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let key = cache_key(question, top_k, category);
        let cache_eligible = self.frequency.record_and_check(question);

        if cache_eligible {
            if let Some(hit) = self.answer_cache.get(&key) {
                tracing::info!("answer cache hit for: {}", question);
                return Ok(hit);
            }
        }

        let sources = self.retrieve_sources(question, top_k, category).await?;

        let top_score = sources.first().map(|s| s.relevance_score);
        if top_score.unwrap_or(0.0) < self.settings.min_relevance_score {
            tracing::info!(
                "top relevance {:?} below threshold {} - returning no information response",
                top_score,
                self.settings.min_relevance_score
            );
            return Ok(QueryResult {
                question: question.to_string(),
                answer: NO_INFORMATION_ANSWER.to_string(),
                sources,
            });
        }

        let prompt = build_prompt(question, &sources);
        let answer = self
            .completion
            .complete(&prompt, 0.2, 256)
            .await
            .map_err(|e| SearchError::Completion(e.to_string()))?;

        let result = QueryResult {
            question: question.to_string(),
            answer,
            sources,
        };

        let should_cache = cache_eligible
            && passes_quality_gate(
                result.sources.first().map(|s| s.relevance_score),
                &result.answer,
                self.settings.min_cacheable_score,
            );
        if should_cache {
            // A full cache skips the store; the request still succeeds
            self.answer_cache.insert(key, result.clone());
        } else {
            tracing::debug!(
                "skipped caching result for {:?} (eligible={})",
                question,
                cache_eligible
            );
        }

        Ok(result)
    }

    /// Remove a document's chunks from the lexical index and vector store
    pub async fn remove_document(&self, document_id: &str) -> Result<usize, SearchError> {
        if document_id.trim().is_empty() {
            return Err(SearchError::InvalidInput {
                field: "document_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let removed = self.bm25.write().await.remove_by_document(document_id);

        self.vector_store
            .delete_by_document(document_id)
            .await
            .map_err(|e| SearchError::VectorDelete(e.to_string()))?;

        Ok(removed)
    }

    pub async fn index_stats(&self) -> IndexStats {
        self.bm25.read().await.stats()
    }

    pub fn frequency_stats(&self) -> FrequencyStats {
        self.frequency.stats()
    }

    pub fn cached_answers(&self) -> usize {
        self.answer_cache.len()
    }

    pub fn cached_embeddings(&self) -> usize {
        self.embedding_cache.len()
    }

    /// Clear the lexical index (useful before a full re-ingest)
    pub async fn clear_index(&self) {
        self.bm25.write().await.clear();
    }

    // Retrieval (+ optional rerank) producing answer sources.
    //
    // Fused scores are rank-derived and tiny, so sources expose a bounded
    // relevance instead: the rerank score when reranking ran, the dense
    // similarity otherwise. The floor checks below stay meaningful that way.
    async fn retrieve_sources(
        &self,
        question: &str,
        top_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SourceChunk>, SearchError> {
        if !self.reranker.is_enabled() {
            let fused = self.retrieve(question, top_k, category).await?;
            return Ok(fused.into_iter().map(source_from_fused).collect());
        }

        let candidate_count = self.reranker.candidate_count().max(top_k);
        let candidates = self.retrieve(question, candidate_count, category).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<RerankDocument> = candidates
            .iter()
            .map(|c| {
                let mut metadata = std::collections::HashMap::new();
                metadata.insert(
                    "documentId".to_string(),
                    serde_json::Value::String(c.document_id.clone()),
                );
                metadata.insert("chunkIndex".to_string(), serde_json::json!(c.chunk_index));
                RerankDocument {
                    id: c.id.clone(),
                    text: c.text.clone(),
                    initial_score: c.dense_score,
                    metadata,
                }
            })
            .collect();

        let reranked = self.reranker.rerank(question, documents, top_k).await;

        Ok(reranked
            .into_iter()
            .map(|r| {
                let candidate = &candidates[r.original_rank];
                SourceChunk {
                    document_id: candidate.document_id.clone(),
                    chunk_index: candidate.chunk_index,
                    relevance_score: r.rerank_score,
                    text: r.text,
                }
            })
            .collect())
    }

    async fn dense_search(
        &self,
        query: &str,
        fetch_k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let vector = self.query_embedding(query).await?;
        self.vector_store
            .search(&vector, fetch_k, category)
            .await
            .map_err(|e| SearchError::VectorSearch(e.to_string()))
    }

    async fn sparse_search(
        &self,
        query: &str,
        fetch_k: usize,
        category: Option<&str>,
    ) -> Vec<SearchHit> {
        let index = self.bm25.read().await;
        index
            .search(query, fetch_k, category)
            .into_iter()
            .map(hit_from_bm25)
            .collect()
    }

    /// Query embeddings go through the exact-text cache; document embeddings
    /// during ingestion do not (they are seen once)
    async fn query_embedding(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        if let Some(cached) = self.embedding_cache.get(text) {
            return Ok(cached);
        }

        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e: ProviderError| SearchError::Embedding(e.to_string()))?;

        self.embedding_cache.insert(text.to_string(), vector.clone());
        Ok(vector)
    }
}

/// Deterministic chunk id from document id, position, and content
fn stable_id(document_id: &str, chunk_index: usize, text: &str) -> String {
    let digest = blake3::hash(format!("{}:{}:{}", document_id, chunk_index, text).as_bytes());
    digest.to_hex()[..32].to_string()
}

fn hit_from_bm25(hit: Bm25Hit) -> SearchHit {
    SearchHit {
        id: hit.id,
        document_id: hit.document_id,
        chunk_index: hit.chunk_index,
        text: hit.text,
        score: hit.score,
    }
}

fn source_from_fused(fused: FusedResult) -> SourceChunk {
    // Dense similarity is the bounded signal; a sparse-only hit has none and
    // reports 0.0 rather than an incomparable BM25 weight
    SourceChunk {
        document_id: fused.document_id,
        chunk_index: fused.chunk_index,
        relevance_score: fused.dense_score,
        text: fused.text,
    }
}

fn build_prompt(question: &str, sources: &[SourceChunk]) -> String {
    let context_block = sources
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You are a helpful assistant answering questions based on the provided documentation.\n\
         \n\
         RULES:\n\
         1. Use the information from the context below to answer the question.\n\
         2. Do not make up information that is not in the context.\n\
         3. If the context does not contain relevant information, say \"I don't have information about that in the knowledge base.\"\n\
         \n\
         FORMAT:\n\
         - Respond in plain, natural language.\n\
         - If asked about steps or processes, use numbered steps.\n\
         \n\
         Context:\n\
         {}\n\
         \n\
         Question: {}\n\
         \n\
         Answer:",
        context_block, question
    )
}
