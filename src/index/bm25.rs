//! BM25 inverted index for sparse/lexical retrieval

use ahash::AHashMap;
use serde::Serialize;

// BM25 tuning parameters
const K1: f64 = 1.5; // Term frequency saturation (1.2-2.0 typical)
const B: f64 = 0.75; // Length normalization (0.75 typical)

/// Common English stopwords filtered out during tokenization
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "have", "been", "were", "they", "this", "that", "with", "from", "will",
    "would", "there", "their", "what", "about", "which", "when", "make", "like", "time", "just",
    "know", "take", "into", "year", "your", "some", "could", "them", "than", "then", "now", "look",
    "only", "come", "its", "over", "also", "back", "after", "use", "two", "how", "first", "well",
    "way", "even", "new", "want", "because", "any", "these", "give", "most", "being",
];

/// An indexed chunk with its precomputed term statistics
#[derive(Debug, Clone)]
struct IndexedChunk {
    id: String,
    document_id: String,
    chunk_index: usize,
    text: String,
    term_frequencies: AHashMap<String, u32>,
    length: usize,
    categories: Vec<String>,
    // Monotonic insertion sequence, used to break score ties deterministically
    seq: u64,
}

/// BM25 search result
#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f64,
}

/// Index statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub vocabulary_size: usize,
    pub average_document_length: f64,
}

/// In-memory BM25 index
///
/// Mutations (`index`, `remove`, `remove_by_document`, `clear`) take `&mut
/// self` and must be serialized by the caller's lock; `search` is read-only
/// and may run concurrently with other readers.
#[derive(Debug, Default)]
pub struct Bm25Index {
    chunks: AHashMap<String, IndexedChunk>,
    postings: AHashMap<String, AHashMap<String, u32>>,
    avg_doc_length: f64,
    next_seq: u64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a chunk, replacing any existing entry with the same id
    ///
    /// Re-indexing identical content is idempotent: the old entry is fully
    /// removed before the new one is inserted.
    pub fn index(
        &mut self,
        id: &str,
        document_id: &str,
        chunk_index: usize,
        text: &str,
        categories: &[String],
    ) {
        if self.chunks.contains_key(id) {
            self.remove(id);
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }

        let mut term_frequencies: AHashMap<String, u32> = AHashMap::new();
        for token in &tokens {
            *term_frequencies.entry(token.clone()).or_insert(0) += 1;
        }

        for (term, tf) in &term_frequencies {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(id.to_string(), *tf);
        }

        let length = tokens.len();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.chunks.insert(
            id.to_string(),
            IndexedChunk {
                id: id.to_string(),
                document_id: document_id.to_string(),
                chunk_index,
                text: text.to_string(),
                term_frequencies,
                length,
                categories: categories.to_vec(),
                seq,
            },
        );

        self.recalculate_avg_length();

        tracing::debug!("indexed chunk {} with {} tokens", id, length);
    }

    /// Remove a chunk from the index; returns false if it was not present
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(chunk) = self.chunks.remove(id) else {
            return false;
        };

        for term in chunk.term_frequencies.keys() {
            if let Some(postings) = self.postings.get_mut(term) {
                postings.remove(id);
                if postings.is_empty() {
                    self.postings.remove(term);
                }
            }
        }

        self.recalculate_avg_length();

        tracing::debug!("removed chunk {} from index", id);
        true
    }

    /// Remove every chunk belonging to a document; returns the removed count
    pub fn remove_by_document(&mut self, document_id: &str) -> usize {
        let to_remove: Vec<String> = self
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id.clone())
            .collect();

        for id in &to_remove {
            self.remove(id);
        }

        tracing::info!("removed {} chunks for document {}", to_remove.len(), document_id);
        to_remove.len()
    }

    /// Clear the entire index
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.postings.clear();
        self.avg_doc_length = 0.0;
        tracing::info!("cleared BM25 index");
    }

    /// Search with BM25 scoring
    ///
    /// Per query term: `idf = ln((N - df + 0.5)/(df + 0.5) + 1)`; per chunk:
    /// `idf * tf*(k1+1) / (tf + k1*(1 - b + b*len/avg_len))`, summed over
    /// terms. A category filter restricts candidates before any score
    /// accrues. Empty query or empty index yields an empty result.
    pub fn search(&self, query: &str, top_k: usize, category_filter: Option<&str>) -> Vec<Bm25Hit> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.chunks.is_empty() {
            return Vec::new();
        }

        let total = self.chunks.len() as f64;
        let mut scores: AHashMap<&str, f64> = AHashMap::new();

        for term in &query_terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };

            let df = postings.len() as f64;
            let idf = ((total - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (chunk_id, tf) in postings {
                let Some(chunk) = self.chunks.get(chunk_id) else {
                    continue;
                };

                if let Some(filter) = category_filter {
                    if !chunk.categories.iter().any(|c| c == filter) {
                        continue;
                    }
                }

                let doc_length = chunk.length as f64;
                let length_norm = 1.0 - B + B * (doc_length / self.avg_doc_length);
                let tf = f64::from(*tf);
                let tf_norm = (tf * (K1 + 1.0)) / (tf + K1 * length_norm);

                *scores.entry(chunk.id.as_str()).or_insert(0.0) += idf * tf_norm;
            }
        }

        let mut scored: Vec<(&IndexedChunk, f64)> = scores
            .into_iter()
            .filter_map(|(id, score)| self.chunks.get(id).map(|c| (c, score)))
            .collect();

        // Descending by score; insertion order breaks ties
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.seq.cmp(&b.0.seq))
        });
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(chunk, score)| Bm25Hit {
                id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    pub fn average_document_length(&self) -> f64 {
        self.avg_doc_length
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_chunks: self.chunks.len(),
            vocabulary_size: self.postings.len(),
            average_document_length: self.avg_doc_length,
        }
    }

    fn recalculate_avg_length(&mut self) {
        if self.chunks.is_empty() {
            self.avg_doc_length = 0.0;
        } else {
            let total: usize = self.chunks.values().map(|c| c.length).sum();
            self.avg_doc_length = total as f64 / self.chunks.len() as f64;
        }
    }
}

/// Tokenize text into index terms
///
/// Lowercase, replace non `[a-z0-9]` with whitespace, split, then drop
/// tokens of 2 chars or fewer and stopwords.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}
