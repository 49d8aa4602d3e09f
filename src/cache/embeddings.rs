//! Bounded embedding cache keyed on exact input text

use ahash::AHashMap;
use std::sync::Mutex;

/// Embedding memoization
///
/// Embeddings are a deterministic, pure function of their input text, so no
/// frequency or quality gate applies; the only policy is the capacity bound,
/// and a full cache silently skips the store.
pub struct EmbeddingCache {
    entries: Mutex<AHashMap<String, Vec<f32>>>,
    capacity: usize,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.entries
            .lock()
            .expect("embedding cache lock poisoned")
            .get(text)
            .cloned()
    }

    pub fn insert(&self, text: String, embedding: Vec<f32>) -> bool {
        let mut entries = self.entries.lock().expect("embedding cache lock poisoned");
        if entries.len() >= self.capacity && !entries.contains_key(&text) {
            return false;
        }
        entries.insert(text, embedding);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("embedding cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
