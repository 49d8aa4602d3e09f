//! Minimal Qdrant REST client implementing the vector store capability

use super::{ProviderError, VectorPoint, VectorStore};
use crate::retrieval::SearchHit;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Thin Qdrant HTTP client
///
/// The collection is created lazily on first write (idempotent GET + PUT);
/// payloads carry `documentId`, `chunkIndex`, `text` and `categories` so
/// search results hydrate without a second lookup.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    vector_size: usize,
    distance: String,
    ensured: AtomicBool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f64,
    payload: Option<PointPayload>,
}

#[derive(Deserialize)]
struct PointPayload {
    #[serde(rename = "documentId")]
    document_id: String,
    #[serde(rename = "chunkIndex")]
    chunk_index: usize,
    text: String,
    #[serde(rename = "chunkId")]
    chunk_id: String,
}

impl QdrantStore {
    pub fn new(base_url: &str, collection: &str, vector_size: usize, distance: &str) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");

        let distance = if distance.is_empty() {
            "Cosine".to_string()
        } else {
            distance.to_string()
        };

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            vector_size,
            distance,
            ensured: AtomicBool::new(false),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Idempotent existence check + create
    async fn ensure_collection(&self) -> Result<(), ProviderError> {
        if self.ensured.load(Ordering::Acquire) {
            return Ok(());
        }

        let response = self.client.get(self.collection_url()).send().await?;
        match response.status().as_u16() {
            200 => {
                self.ensured.store(true, Ordering::Release);
                return Ok(());
            }
            404 => {}
            other => {
                return Err(ProviderError::Request(format!(
                    "qdrant GET collection HTTP {}",
                    other
                )))
            }
        }

        let body = json!({
            "vectors": { "size": self.vector_size, "distance": self.distance }
        });
        let response = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "qdrant CREATE collection HTTP {}",
                response.status()
            )));
        }

        self.ensured.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert_batch(&self, points: Vec<VectorPoint>) -> Result<(), ProviderError> {
        if points.is_empty() {
            return Ok(());
        }
        self.ensure_collection().await?;

        let mut body_points = Vec::with_capacity(points.len());
        for p in &points {
            if p.vector.len() != self.vector_size {
                return Err(ProviderError::DimensionMismatch {
                    id: p.id.clone(),
                    expected: self.vector_size,
                    actual: p.vector.len(),
                });
            }
            body_points.push(json!({
                "id": p.id,
                "vector": p.vector,
                "payload": {
                    "chunkId": p.id,
                    "documentId": p.document_id,
                    "chunkIndex": p.chunk_index,
                    "text": p.text,
                    "categories": p.categories,
                },
            }));
        }

        let response = self
            .client
            .put(format!("{}/points", self.collection_url()))
            .json(&json!({ "points": body_points }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "qdrant upsert HTTP {}",
                response.status()
            )));
        }

        tracing::debug!("upserted {} points to {}", points.len(), self.collection);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        category_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(category) = category_filter {
            body["filter"] = json!({
                "must": [{ "key": "categories", "match": { "value": category } }]
            });
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "qdrant search HTTP {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(format!("bad search response: {}", e)))?;

        Ok(parsed
            .result
            .into_iter()
            .filter_map(|p| {
                let payload = p.payload?;
                Some(SearchHit {
                    id: payload.chunk_id,
                    document_id: payload.document_id,
                    chunk_index: payload.chunk_index,
                    text: payload.text,
                    score: p.score,
                })
            })
            .collect())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), ProviderError> {
        let body = json!({
            "filter": {
                "must": [{ "key": "documentId", "match": { "value": document_id } }]
            }
        });

        let response = self
            .client
            .post(format!("{}/points/delete", self.collection_url()))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Request(format!(
                "qdrant delete HTTP {}",
                response.status()
            )));
        }

        tracing::debug!("deleted points for document {}", document_id);
        Ok(())
    }
}
