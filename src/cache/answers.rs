//! Bounded answer cache with quality-gated admission

use ahash::AHashMap;
use regex::Regex;
use std::sync::Mutex;

/// Phrasings that mark an answer as "no information found"
const NO_INFORMATION_PHRASES: &[&str] = &[
    "i don't know",
    "i do not know",
    "no information",
    "not in the context",
    "context does not provide",
    "cannot find",
    "is not available",
    "there is no",
];

/// Bounded in-memory result cache
///
/// Once the capacity bound is reached, insertion is skipped rather than
/// evicting: a full cache is treated as "do not cache this result" and never
/// fails the request that produced it.
pub struct AnswerCache<V> {
    entries: Mutex<AHashMap<String, V>>,
    capacity: usize,
}

impl<V: Clone> AnswerCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries
            .lock()
            .expect("answer cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Insert if capacity allows; returns whether the value was stored
    pub fn insert(&self, key: String, value: V) -> bool {
        let mut entries = self.entries.lock().expect("answer cache lock poisoned");
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            tracing::debug!("answer cache full ({} entries), skipping insert", self.capacity);
            return false;
        }
        entries.insert(key, value);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("answer cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().expect("answer cache lock poisoned").clear();
    }
}

/// Cache key for a RAG answer
///
/// The question is lowercased and trimmed; the category flows through with
/// its casing preserved, matching the behavior observed in the original
/// service.
pub fn cache_key(question: &str, top_k: usize, category: Option<&str>) -> String {
    format!(
        "{}|{}|{}",
        question.to_lowercase().trim(),
        top_k,
        category.unwrap_or("")
    )
}

/// Does this answer say "I found nothing"?
///
/// Such answers may become valid later as more documents are ingested, so
/// they must never be cached as permanent misses.
pub fn is_no_information_answer(answer: &str) -> bool {
    if answer.is_empty() {
        return true;
    }

    let lower = answer.to_lowercase().trim().to_string();
    if NO_INFORMATION_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }

    let exact_not_found =
        Regex::new(r"^(i don't know|unknown|not found)\.?$").expect("static regex");
    exact_not_found.is_match(&lower)
}

/// Admission rule for the answer cache
///
/// Requires at least one retrieved source, a top relevance score at or above
/// the floor, and an answer that actually says something.
pub fn passes_quality_gate(top_source_score: Option<f64>, answer: &str, min_score: f64) -> bool {
    match top_source_score {
        Some(score) => score >= min_score && !is_no_information_answer(answer),
        None => false,
    }
}
