//! Second-pass reranking with pluggable backends
//!
//! Reranking is a quality enhancement, never a hard dependency: any backend
//! failure degrades to passthrough (original order, original scores) instead
//! of failing the request. The backend is chosen once at construction from a
//! closed set, so no provider strings leak into call sites.

use crate::provider::CompletionProvider;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const COHERE_ENDPOINT: &str = "https://api.cohere.ai/v1/rerank";
const JINA_ENDPOINT: &str = "https://api.jina.ai/v1/rerank";

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Rerank request failed: {0}")]
    Request(String),

    #[error("Unexpected rerank response: {0}")]
    BadResponse(String),
}

/// Candidate document entering the rerank stage
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: String,
    pub text: String,
    pub initial_score: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Re-ranked result preserving the pre-rerank rank for auditability
#[derive(Debug, Clone)]
pub struct RerankResult {
    pub id: String,
    pub text: String,
    pub rerank_score: f64,
    pub initial_score: f64,
    pub original_rank: usize,
    pub new_rank: usize,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Closed set of rerank backends, selected once from configuration
pub enum RerankBackend {
    /// Local cross-encoder behind an OpenAI-compatible rerank endpoint
    /// (llama.cpp, vLLM, TEI)
    Local { base_url: String, model: String },
    /// Cohere-style hosted rerank API
    Cohere { api_key: String, model: String },
    /// Jina-style hosted rerank API
    Jina { api_key: String, model: String },
    /// Score one document at a time through the completion capability
    Llm { completion: Arc<dyn CompletionProvider> },
    /// Passthrough: original order, original scores, floor ignored
    Disabled,
}

impl RerankBackend {
    fn name(&self) -> &'static str {
        match self {
            RerankBackend::Local { .. } => "local",
            RerankBackend::Cohere { .. } => "cohere",
            RerankBackend::Jina { .. } => "jina",
            RerankBackend::Llm { .. } => "llm",
            RerankBackend::Disabled => "disabled",
        }
    }
}

#[derive(Deserialize)]
struct RerankApiResponse {
    results: Vec<RerankApiItem>,
}

#[derive(Deserialize)]
struct RerankApiItem {
    index: usize,
    #[serde(default)]
    relevance_score: Option<f64>,
    #[serde(default)]
    score: Option<f64>,
}

impl RerankApiItem {
    fn score(&self) -> f64 {
        self.relevance_score.or(self.score).unwrap_or(0.0)
    }
}

/// Reranker over an ordered candidate list
pub struct Reranker {
    backend: RerankBackend,
    client: reqwest::Client,
    min_score: f64,
    candidate_count: usize,
}

impl Reranker {
    pub fn new(backend: RerankBackend, min_score: f64, candidate_count: usize) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");

        tracing::info!(
            "reranker initialized: backend={}, candidate_count={}, min_score={}",
            backend.name(),
            candidate_count,
            min_score
        );

        Self {
            backend,
            client,
            min_score,
            candidate_count,
        }
    }

    pub fn disabled() -> Self {
        Self::new(RerankBackend::Disabled, 0.0, 0)
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, RerankBackend::Disabled)
    }

    /// How many initial-retrieval candidates the rerank stage wants to see
    pub fn candidate_count(&self) -> usize {
        self.candidate_count
    }

    /// Re-rank documents for a query, returning at most `top_k` results
    ///
    /// Backend failures fall back to passthrough rather than propagating.
    pub async fn rerank(
        &self,
        query: &str,
        documents: Vec<RerankDocument>,
        top_k: usize,
    ) -> Vec<RerankResult> {
        if documents.is_empty() {
            return Vec::new();
        }

        if let RerankBackend::Disabled = self.backend {
            tracing::debug!("reranker disabled, returning original order");
            return passthrough(&documents, top_k);
        }

        let started = std::time::Instant::now();

        let outcome = match &self.backend {
            RerankBackend::Local { base_url, model } => {
                self.rerank_local(base_url, model, query, &documents, top_k).await
            }
            RerankBackend::Cohere { api_key, model } => {
                self.rerank_hosted(COHERE_ENDPOINT, api_key, model, query, &documents, top_k)
                    .await
            }
            RerankBackend::Jina { api_key, model } => {
                self.rerank_hosted(JINA_ENDPOINT, api_key, model, query, &documents, top_k)
                    .await
            }
            RerankBackend::Llm { completion } => {
                Ok(self.rerank_with_llm(completion.as_ref(), query, &documents, top_k).await)
            }
            RerankBackend::Disabled => unreachable!("handled above"),
        };

        match outcome {
            Ok(results) => {
                tracing::info!(
                    "rerank: {}ms for {} documents -> {} results (backend={})",
                    started.elapsed().as_millis(),
                    documents.len(),
                    results.len(),
                    self.backend.name()
                );
                results
            }
            Err(e) => {
                tracing::warn!("rerank failed, returning original order: {}", e);
                passthrough(&documents, top_k)
            }
        }
    }

    /// Local cross-encoder: try `/v1/rerank`, then `/rerank`
    async fn rerank_local(
        &self,
        base_url: &str,
        model: &str,
        query: &str,
        documents: &[RerankDocument],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        let body = json!({
            "query": query,
            "model": model,
            "top_n": top_k,
            "documents": documents.iter().map(|d| d.text.as_str()).collect::<Vec<_>>(),
        });

        let base = base_url.trim_end_matches('/');
        for endpoint in ["/v1/rerank", "/rerank"] {
            let response = self
                .client
                .post(format!("{}{}", base, endpoint))
                .json(&body)
                .send()
                .await;

            match response {
                Ok(r) if r.status().is_success() => {
                    let parsed: RerankApiResponse = r
                        .json()
                        .await
                        .map_err(|e| RerankError::BadResponse(e.to_string()))?;
                    return Ok(self.map_api_results(parsed, documents, top_k));
                }
                Ok(r) => {
                    tracing::debug!("rerank endpoint {} returned HTTP {}", endpoint, r.status());
                }
                Err(e) => {
                    tracing::debug!("rerank endpoint {} failed: {}", endpoint, e);
                }
            }
        }

        Err(RerankError::Request("local reranker request failed".to_string()))
    }

    /// Cohere/Jina-style hosted APIs share one request and response shape
    async fn rerank_hosted(
        &self,
        endpoint: &str,
        api_key: &str,
        model: &str,
        query: &str,
        documents: &[RerankDocument],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, RerankError> {
        let body = json!({
            "query": query,
            "model": model,
            "top_n": top_k,
            "return_documents": false,
            "documents": documents.iter().map(|d| d.text.as_str()).collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RerankError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RerankError::Request(format!(
                "rerank HTTP {}",
                response.status()
            )));
        }

        let parsed: RerankApiResponse = response
            .json()
            .await
            .map_err(|e| RerankError::BadResponse(e.to_string()))?;

        Ok(self.map_api_results(parsed, documents, top_k))
    }

    /// Map `(index, relevance_score)` pairs back to candidate identities
    fn map_api_results(
        &self,
        response: RerankApiResponse,
        documents: &[RerankDocument],
        top_k: usize,
    ) -> Vec<RerankResult> {
        let mut output = Vec::new();

        for item in response.results {
            if output.len() >= top_k {
                break;
            }

            let score = item.score();
            if item.index >= documents.len() || score < self.min_score {
                continue;
            }

            let doc = &documents[item.index];
            output.push(RerankResult {
                id: doc.id.clone(),
                text: doc.text.clone(),
                rerank_score: score,
                initial_score: doc.initial_score,
                original_rank: item.index,
                new_rank: output.len(),
                metadata: doc.metadata.clone(),
            });
        }

        output
    }

    /// Score documents one at a time with a 0-10 relevance prompt
    ///
    /// A parse or request failure for one document degrades that document to
    /// a neutral 0.5, never the whole batch.
    async fn rerank_with_llm(
        &self,
        completion: &dyn CompletionProvider,
        query: &str,
        documents: &[RerankDocument],
        top_k: usize,
    ) -> Vec<RerankResult> {
        let mut scored: Vec<(usize, f64)> = Vec::with_capacity(documents.len());

        for (rank, doc) in documents.iter().enumerate() {
            let score = self.score_single_document(completion, query, &doc.text).await;
            scored.push((rank, score));
        }

        // Stable sort keeps original order between equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut output = Vec::new();
        for (original_rank, score) in scored.into_iter().take(top_k) {
            if score < self.min_score {
                continue;
            }
            let doc = &documents[original_rank];
            output.push(RerankResult {
                id: doc.id.clone(),
                text: doc.text.clone(),
                rerank_score: score,
                initial_score: doc.initial_score,
                original_rank,
                new_rank: output.len(),
                metadata: doc.metadata.clone(),
            });
        }

        output
    }

    async fn score_single_document(
        &self,
        completion: &dyn CompletionProvider,
        query: &str,
        document: &str,
    ) -> f64 {
        let prompt = format!(
            "Rate the relevance of the following document to the query on a scale of 0 to 10.\n\
             Only respond with a single number, nothing else.\n\n\
             Query: {}\n\n\
             Document: {}\n\n\
             Relevance score (0-10):",
            query,
            truncate(document, 500)
        );

        match completion.complete(&prompt, 0.0, 5).await {
            Ok(text) => match text.trim().parse::<f64>() {
                Ok(raw) => raw / 10.0,
                Err(_) => {
                    tracing::warn!("LLM rerank score unparsable: {:?}", text.trim());
                    0.5
                }
            },
            Err(e) => {
                tracing::warn!("LLM rerank scoring failed: {}", e);
                0.5
            }
        }
    }
}

/// Original order, original scores; used when disabled or on backend failure
fn passthrough(documents: &[RerankDocument], top_k: usize) -> Vec<RerankResult> {
    documents
        .iter()
        .take(top_k)
        .enumerate()
        .map(|(rank, doc)| RerankResult {
            id: doc.id.clone(),
            text: doc.text.clone(),
            rerank_score: doc.initial_score,
            initial_score: doc.initial_score,
            original_rank: rank,
            new_rank: rank,
            metadata: doc.metadata.clone(),
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;

    fn docs(n: usize) -> Vec<RerankDocument> {
        (0..n)
            .map(|i| RerankDocument {
                id: format!("id{}", i + 1),
                text: format!("Document number {}", i + 1),
                initial_score: 0.9 - i as f64 * 0.1,
                metadata: HashMap::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_disabled_returns_original_order() {
        let reranker = Reranker::disabled();

        let results = reranker.rerank("programming languages", docs(3), 3).await;

        assert_eq!(results.len(), 3);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.id, format!("id{}", i + 1));
            assert_eq!(r.rerank_score, r.initial_score);
            assert_eq!(r.original_rank, i);
            assert_eq!(r.new_rank, i);
        }
    }

    #[tokio::test]
    async fn test_disabled_respects_top_k() {
        let reranker = Reranker::disabled();

        let results = reranker.rerank("test query", docs(5), 2).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "id1");
        assert_eq!(results[1].id, "id2");
    }

    #[tokio::test]
    async fn test_empty_documents() {
        let reranker = Reranker::disabled();
        assert!(reranker.rerank("query", Vec::new(), 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_backend_falls_back_to_passthrough() {
        // A port that refuses connections forces the failure path
        let reranker = Reranker::new(
            RerankBackend::Local {
                base_url: "http://127.0.0.1:1".to_string(),
                model: "bge-reranker-base".to_string(),
            },
            0.0,
            50,
        );

        let input = docs(3);
        let results = reranker.rerank("query", input.clone(), 3).await;

        assert_eq!(results.len(), 3);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.id, input[i].id);
            assert_eq!(r.rerank_score, r.initial_score);
            assert_eq!(r.new_rank, r.original_rank);
        }
    }

    #[test]
    fn test_map_api_results_filters_and_ranks() {
        let reranker = Reranker::new(
            RerankBackend::Local {
                base_url: "http://localhost:8001".to_string(),
                model: "m".to_string(),
            },
            0.5,
            50,
        );

        let response = RerankApiResponse {
            results: vec![
                RerankApiItem {
                    index: 2,
                    relevance_score: Some(0.95),
                    score: None,
                },
                RerankApiItem {
                    index: 0,
                    relevance_score: Some(0.40), // below floor
                    score: None,
                },
                RerankApiItem {
                    index: 9, // out of bounds
                    relevance_score: Some(0.90),
                    score: None,
                },
                RerankApiItem {
                    index: 1,
                    relevance_score: None,
                    score: Some(0.60), // alternate score field
                },
            ],
        };

        let documents = docs(3);
        let results = reranker.map_api_results(response, &documents, 5);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "id3");
        assert_eq!(results[0].original_rank, 2);
        assert_eq!(results[0].new_rank, 0);
        assert_eq!(results[1].id, "id2");
        assert_eq!(results[1].rerank_score, 0.60);
        assert_eq!(results[1].new_rank, 1);
    }

    struct ScriptedCompletion {
        replies: Vec<std::result::Result<String, ()>>,
        calls: std::sync::Mutex<usize>,
    }

    #[async_trait]
    impl CompletionProvider for ScriptedCompletion {
        async fn complete(
            &self,
            _prompt: &str,
            _temperature: f32,
            _max_tokens: u32,
        ) -> std::result::Result<String, ProviderError> {
            let mut calls = self.calls.lock().unwrap();
            let reply = self.replies[*calls % self.replies.len()].clone();
            *calls += 1;
            reply.map_err(|_| ProviderError::Request("scripted failure".to_string()))
        }
    }

    #[tokio::test]
    async fn test_llm_scoring_normalizes_and_defaults() {
        let completion = Arc::new(ScriptedCompletion {
            replies: vec![
                Ok("8".to_string()),
                Ok("not a number".to_string()),
                Ok("3".to_string()),
            ],
            calls: std::sync::Mutex::new(0),
        });

        let reranker = Reranker::new(RerankBackend::Llm { completion }, 0.0, 50);

        let results = reranker.rerank("query", docs(3), 3).await;

        assert_eq!(results.len(), 3);
        // doc1 scored 0.8, doc2 defaulted to 0.5, doc3 scored 0.3
        assert_eq!(results[0].id, "id1");
        assert!((results[0].rerank_score - 0.8).abs() < 1e-12);
        assert_eq!(results[1].id, "id2");
        assert!((results[1].rerank_score - 0.5).abs() < 1e-12);
        assert_eq!(results[2].id, "id3");
        assert!((results[2].rerank_score - 0.3).abs() < 1e-12);

        // new_rank is dense and consistent with descending score order
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.new_rank, i);
        }
    }

    #[tokio::test]
    async fn test_llm_min_score_floor() {
        let completion = Arc::new(ScriptedCompletion {
            replies: vec![Ok("9".to_string()), Ok("2".to_string())],
            calls: std::sync::Mutex::new(0),
        });

        let reranker = Reranker::new(RerankBackend::Llm { completion }, 0.5, 50);
        let results = reranker.rerank("query", docs(2), 5).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "id1");
    }

    #[tokio::test]
    async fn test_llm_provider_error_degrades_per_item() {
        let completion = Arc::new(ScriptedCompletion {
            replies: vec![Err(()), Ok("10".to_string())],
            calls: std::sync::Mutex::new(0),
        });

        let reranker = Reranker::new(RerankBackend::Llm { completion }, 0.0, 50);
        let results = reranker.rerank("query", docs(2), 5).await;

        // Failed item got the neutral default instead of killing the batch
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "id2");
        assert!((results[0].rerank_score - 1.0).abs() < 1e-12);
        assert!((results[1].rerank_score - 0.5).abs() < 1e-12);
    }
}
