//! Reciprocal Rank Fusion of dense and sparse result lists
//!
//! BM25 scores are unbounded and embedding similarities are bounded, so the
//! default fusion is rank-based: no calibration between the two scales is
//! needed. A min-max-normalized linear combination is available as an
//! alternative.

use crate::retrieval::SearchHit;
use ahash::AHashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be positive")]
    InvalidWeights,
}

/// A fused hit carrying both raw scores for downstream explainability
#[derive(Debug, Clone)]
pub struct FusedResult {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub fused_score: f64,
    pub dense_score: f64,
    pub sparse_score: f64,
    pub in_dense: bool,
    pub in_sparse: bool,
}

/// Rank fusion over two ordered result lists
#[derive(Debug, Clone)]
pub struct FusionEngine {
    // RRF constant k (typically 60). Higher k weights ranks more equally;
    // lower k concentrates weight on the top ranks.
    rrf_k: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self { rrf_k: 60.0 }
    }
}

// Per-id accumulator shared by the fusion variants
#[derive(Default)]
struct Accumulator {
    score: f64,
    dense_score: f64,
    sparse_score: f64,
    in_dense: bool,
    in_sparse: bool,
}

impl FusionEngine {
    pub fn new(rrf_k: f64) -> Self {
        Self { rrf_k }
    }

    pub fn rrf_k(&self) -> f64 {
        self.rrf_k
    }

    /// Plain Reciprocal Rank Fusion
    ///
    /// `RRF(d) = sum over lists of 1/(k + rank(d))` with 1-based ranks;
    /// contributions for the same id are summed across lists.
    pub fn fuse_rrf(
        &self,
        dense: &[SearchHit],
        sparse: &[SearchHit],
        top_k: usize,
    ) -> Vec<FusedResult> {
        self.fuse_ranked(dense, sparse, 1.0, 1.0, top_k)
    }

    /// Weighted RRF
    ///
    /// Weights are normalized to sum to 1 before the `w/(k + rank)` division,
    /// letting a caller bias one signal without touching raw scores.
    pub fn fuse_weighted(
        &self,
        dense: &[SearchHit],
        sparse: &[SearchHit],
        dense_weight: f64,
        sparse_weight: f64,
        top_k: usize,
    ) -> Result<Vec<FusedResult>, FusionError> {
        if dense_weight <= 0.0 || sparse_weight <= 0.0 {
            return Err(FusionError::InvalidWeights);
        }

        let total = dense_weight + sparse_weight;
        Ok(self.fuse_ranked(dense, sparse, dense_weight / total, sparse_weight / total, top_k))
    }

    fn fuse_ranked(
        &self,
        dense: &[SearchHit],
        sparse: &[SearchHit],
        dense_weight: f64,
        sparse_weight: f64,
        top_k: usize,
    ) -> Vec<FusedResult> {
        let mut acc: AHashMap<&str, Accumulator> = AHashMap::new();
        let mut hits: AHashMap<&str, &SearchHit> = AHashMap::new();
        // First-appearance order keeps ties deterministic
        let mut order: Vec<&str> = Vec::new();

        for (rank, hit) in dense.iter().enumerate() {
            let entry = acc.entry(hit.id.as_str()).or_insert_with(|| {
                order.push(hit.id.as_str());
                Accumulator::default()
            });
            entry.score += dense_weight / (self.rrf_k + rank as f64 + 1.0);
            entry.dense_score = hit.score;
            entry.in_dense = true;
            hits.entry(hit.id.as_str()).or_insert(hit);
        }

        for (rank, hit) in sparse.iter().enumerate() {
            let entry = acc.entry(hit.id.as_str()).or_insert_with(|| {
                order.push(hit.id.as_str());
                Accumulator::default()
            });
            entry.score += sparse_weight / (self.rrf_k + rank as f64 + 1.0);
            entry.sparse_score = hit.score;
            entry.in_sparse = true;
            hits.entry(hit.id.as_str()).or_insert(hit);
        }

        let results = self.collect_sorted(&acc, &hits, &order, top_k);

        let both = results.iter().filter(|r| r.in_dense && r.in_sparse).count();
        let dense_only = results.iter().filter(|r| r.in_dense && !r.in_sparse).count();
        let sparse_only = results.iter().filter(|r| !r.in_dense && r.in_sparse).count();
        tracing::debug!(
            "RRF fusion: {} results (both={}, dense_only={}, sparse_only={})",
            results.len(),
            both,
            dense_only,
            sparse_only
        );

        results
    }

    /// Linear score combination (alternative to RRF)
    ///
    /// Min-max normalizes each list's native scores to [0,1] independently,
    /// then combines `alpha*dense + (1-alpha)*sparse` per id; an id missing
    /// from one list contributes 0 on that side.
    pub fn fuse_linear(
        &self,
        dense: &[SearchHit],
        sparse: &[SearchHit],
        alpha: f64,
        top_k: usize,
    ) -> Vec<FusedResult> {
        let dense_norm = normalize_scores(dense);
        let sparse_norm = normalize_scores(sparse);

        let mut acc: AHashMap<&str, Accumulator> = AHashMap::new();
        let mut hits: AHashMap<&str, &SearchHit> = AHashMap::new();
        let mut order: Vec<&str> = Vec::new();

        for hit in dense {
            let entry = acc.entry(hit.id.as_str()).or_insert_with(|| {
                order.push(hit.id.as_str());
                Accumulator::default()
            });
            entry.dense_score = hit.score;
            entry.in_dense = true;
            hits.entry(hit.id.as_str()).or_insert(hit);
        }
        for hit in sparse {
            let entry = acc.entry(hit.id.as_str()).or_insert_with(|| {
                order.push(hit.id.as_str());
                Accumulator::default()
            });
            entry.sparse_score = hit.score;
            entry.in_sparse = true;
            hits.entry(hit.id.as_str()).or_insert(hit);
        }

        for (id, entry) in acc.iter_mut() {
            let d = dense_norm.get(id).copied().unwrap_or(0.0);
            let s = sparse_norm.get(id).copied().unwrap_or(0.0);
            entry.score = alpha * d + (1.0 - alpha) * s;
        }

        self.collect_sorted(&acc, &hits, &order, top_k)
    }

    fn collect_sorted(
        &self,
        acc: &AHashMap<&str, Accumulator>,
        hits: &AHashMap<&str, &SearchHit>,
        order: &[&str],
        top_k: usize,
    ) -> Vec<FusedResult> {
        let mut results: Vec<FusedResult> = order
            .iter()
            .map(|id| {
                let entry = &acc[id];
                let hit = hits[id];
                FusedResult {
                    id: hit.id.clone(),
                    document_id: hit.document_id.clone(),
                    chunk_index: hit.chunk_index,
                    text: hit.text.clone(),
                    fused_score: entry.score,
                    dense_score: entry.dense_score,
                    sparse_score: entry.sparse_score,
                    in_dense: entry.in_dense,
                    in_sparse: entry.in_sparse,
                }
            })
            .collect();

        // Stable sort: equal scores keep first-appearance order
        results.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        results
    }
}

/// Min-max normalize a list's scores to [0,1]; a zero range maps everything
/// to 1.0
fn normalize_scores(hits: &[SearchHit]) -> AHashMap<&str, f64> {
    if hits.is_empty() {
        return AHashMap::new();
    }

    let min = hits.iter().map(|h| h.score).fold(f64::INFINITY, f64::min);
    let max = hits.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    hits.iter()
        .map(|h| {
            let norm = if range == 0.0 {
                1.0
            } else {
                (h.score - min) / range
            };
            (h.id.as_str(), norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            document_id: format!("doc-{}", id),
            chunk_index: 0,
            text: format!("text for {}", id),
            score,
        }
    }

    #[test]
    fn test_basic_rrf() {
        let engine = FusionEngine::default();

        let dense = vec![hit("id1", 0.95), hit("id2", 0.85), hit("id3", 0.75)];
        let sparse = vec![hit("id2", 5.5), hit("id4", 4.2), hit("id1", 3.8)];

        let fused = engine.fuse_rrf(&dense, &sparse, 5);

        assert_eq!(fused.len(), 4);
        // Hits present in both lists outrank single-list hits
        assert!(fused[0].in_dense && fused[0].in_sparse);
        for r in &fused {
            assert!(r.fused_score > 0.0);
        }

        let id1 = fused.iter().find(|r| r.id == "id1").unwrap();
        assert_eq!(id1.dense_score, 0.95);
        assert_eq!(id1.sparse_score, 3.8);
    }

    #[test]
    fn test_dual_presence_dominates_single_contribution() {
        let engine = FusionEngine::default();

        let dense = vec![hit("shared", 0.9), hit("dense-only", 0.8)];
        let sparse = vec![hit("sparse-only", 7.0), hit("shared", 3.0)];

        let fused = engine.fuse_rrf(&dense, &sparse, 10);
        let shared = fused.iter().find(|r| r.id == "shared").unwrap();

        // fusedScore of a dual hit is at least either single contribution
        let dense_contribution = 1.0 / (60.0 + 1.0);
        let sparse_contribution = 1.0 / (60.0 + 2.0);
        assert!(shared.fused_score >= dense_contribution);
        assert!(shared.fused_score >= sparse_contribution);
        assert!((shared.fused_score - (dense_contribution + sparse_contribution)).abs() < 1e-12);
    }

    #[test]
    fn test_identity_lists_preserve_order() {
        let engine = FusionEngine::default();

        let list = vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)];
        let fused = engine.fuse_rrf(&list, &list, 5);

        assert_eq!(fused.len(), 3);
        for (i, r) in fused.iter().enumerate() {
            assert!(r.in_dense && r.in_sparse);
            assert_eq!(r.id, list[i].id);
        }
    }

    #[test]
    fn test_one_empty_list_falls_back_to_other_order() {
        let engine = FusionEngine::default();

        let dense = vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)];
        let fused = engine.fuse_rrf(&dense, &[], 5);

        assert_eq!(fused.len(), 3);
        for (i, r) in fused.iter().enumerate() {
            assert_eq!(r.id, dense[i].id);
            assert!(r.in_dense);
            assert!(!r.in_sparse);
            assert_eq!(r.sparse_score, 0.0);
        }

        let sparse = vec![hit("x", 9.0), hit("y", 4.0)];
        let fused = engine.fuse_rrf(&[], &sparse, 5);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, "x");
        assert!(!fused[0].in_dense);
        assert!(fused[0].in_sparse);
    }

    #[test]
    fn test_both_empty() {
        let engine = FusionEngine::default();
        assert!(engine.fuse_rrf(&[], &[], 5).is_empty());
    }

    #[test]
    fn test_weighted_rrf_biases_signal() {
        let engine = FusionEngine::default();

        let dense = vec![hit("dense-hit", 0.95)];
        let sparse = vec![hit("sparse-hit", 5.5)];

        let dense_biased = engine.fuse_weighted(&dense, &sparse, 0.9, 0.1, 5).unwrap();
        assert_eq!(dense_biased[0].id, "dense-hit");

        let sparse_biased = engine.fuse_weighted(&dense, &sparse, 0.1, 0.9, 5).unwrap();
        assert_eq!(sparse_biased[0].id, "sparse-hit");
    }

    #[test]
    fn test_weighted_rrf_rejects_non_positive_weights() {
        let engine = FusionEngine::default();
        assert!(engine.fuse_weighted(&[], &[], 0.0, 1.0, 5).is_err());
        assert!(engine.fuse_weighted(&[], &[], 0.5, -1.0, 5).is_err());
    }

    #[test]
    fn test_weight_normalization() {
        let engine = FusionEngine::default();
        let dense = vec![hit("a", 0.9)];

        // (2.0, 2.0) normalizes to the same contributions as (1.0, 1.0)
        let scaled = engine.fuse_weighted(&dense, &[], 2.0, 2.0, 5).unwrap();
        let plain = engine.fuse_weighted(&dense, &[], 1.0, 1.0, 5).unwrap();
        assert!((scaled[0].fused_score - plain[0].fused_score).abs() < 1e-12);
    }

    #[test]
    fn test_linear_combination() {
        let engine = FusionEngine::default();

        let dense = vec![hit("a", 0.9), hit("b", 0.5)];
        let sparse = vec![hit("b", 10.0), hit("c", 5.0)];

        let fused = engine.fuse_linear(&dense, &sparse, 0.5, 5);
        assert_eq!(fused.len(), 3);

        // b: dense norm 0.0, sparse norm 1.0 -> 0.5
        // a: dense norm 1.0, sparse missing -> 0.5
        // c: sparse norm 0.0, dense missing -> 0.0
        let b = fused.iter().find(|r| r.id == "b").unwrap();
        assert!((b.fused_score - 0.5).abs() < 1e-12);
        let c = fused.iter().find(|r| r.id == "c").unwrap();
        assert_eq!(c.fused_score, 0.0);
        assert!(b.in_dense && b.in_sparse);
    }

    #[test]
    fn test_linear_zero_range_normalizes_to_one() {
        let engine = FusionEngine::default();

        let dense = vec![hit("a", 0.5), hit("b", 0.5)];
        let fused = engine.fuse_linear(&dense, &[], 1.0, 5);

        for r in &fused {
            assert!((r.fused_score - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_top_k_truncation() {
        let engine = FusionEngine::default();

        let dense: Vec<SearchHit> = (0..5)
            .map(|i| hit(&format!("id{}", i), 1.0 - i as f64 * 0.1))
            .collect();

        let fused = engine.fuse_rrf(&dense, &[], 3);
        assert_eq!(fused.len(), 3);
    }
}
