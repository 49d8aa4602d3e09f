//! Question frequency tracking for the answer-cache admission gate

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

/// Per-question counter record, keyed by the hash of the normalized text
#[derive(Debug, Clone, Serialize)]
pub struct QuestionFrequencyRecord {
    pub question_hash: String,
    pub normalized_question: String,
    pub ask_count: u64,
    pub is_cached: bool,
    pub first_asked_at: DateTime<Utc>,
    pub last_asked_at: DateTime<Utc>,
}

/// Aggregate statistics over all tracked questions
#[derive(Debug, Clone, Serialize)]
pub struct FrequencyStats {
    pub unique_questions: usize,
    pub total_asks: u64,
    pub cached_questions: usize,
    pub cache_threshold: u64,
}

/// Tracks how often each normalized question has been asked
///
/// Only questions asked at least `threshold` times become cache-eligible;
/// everything below the threshold always executes a fresh call.
pub struct FrequencyTracker {
    records: Mutex<AHashMap<String, QuestionFrequencyRecord>>,
    threshold: u64,
}

impl FrequencyTracker {
    pub fn new(threshold: u64) -> Self {
        Self {
            records: Mutex::new(AHashMap::new()),
            threshold: threshold.max(1),
        }
    }

    /// Record an ask and report whether the question is now cache-eligible
    ///
    /// The increment and the check are one atomic step under the lock.
    /// `is_cached` flips to true once the threshold is crossed and never
    /// reverts.
    pub fn record_and_check(&self, question: &str) -> bool {
        let normalized = normalize_question(question);
        let hash = blake3::hash(normalized.as_bytes()).to_hex().to_string();
        let now = Utc::now();

        let mut records = self.records.lock().expect("frequency lock poisoned");
        let record = records
            .entry(hash.clone())
            .and_modify(|r| {
                r.ask_count += 1;
                r.last_asked_at = now;
            })
            .or_insert_with(|| QuestionFrequencyRecord {
                question_hash: hash,
                normalized_question: normalized,
                ask_count: 1,
                is_cached: false,
                first_asked_at: now,
                last_asked_at: now,
            });

        let eligible = record.ask_count >= self.threshold;
        if eligible && !record.is_cached {
            record.is_cached = true;
        }
        eligible
    }

    pub fn stats(&self) -> FrequencyStats {
        let records = self.records.lock().expect("frequency lock poisoned");
        FrequencyStats {
            unique_questions: records.len(),
            total_asks: records.values().map(|r| r.ask_count).sum(),
            cached_questions: records.values().filter(|r| r.is_cached).count(),
            cache_threshold: self.threshold,
        }
    }

    /// Most-asked questions, descending
    pub fn top_questions(&self, limit: usize) -> Vec<QuestionFrequencyRecord> {
        let records = self.records.lock().expect("frequency lock poisoned");
        let mut all: Vec<QuestionFrequencyRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.ask_count.cmp(&a.ask_count));
        all.truncate(limit);
        all
    }
}

/// Normalize a question so casing, spacing and punctuation variants collapse
fn normalize_question(question: &str) -> String {
    question
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '?' | '!' | '.' | ',' | ';' | ':'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_gates_eligibility() {
        let tracker = FrequencyTracker::new(2);

        assert!(!tracker.record_and_check("How do I reset my password?"));
        assert!(tracker.record_and_check("How do I reset my password?"));
        assert!(tracker.record_and_check("How do I reset my password?"));
    }

    #[test]
    fn test_normalization_collapses_variants() {
        let tracker = FrequencyTracker::new(2);

        assert!(!tracker.record_and_check("How do I reset my password?"));
        // Different casing, spacing and punctuation, same question
        assert!(tracker.record_and_check("how  do i RESET my password"));

        let stats = tracker.stats();
        assert_eq!(stats.unique_questions, 1);
        assert_eq!(stats.total_asks, 2);
    }

    #[test]
    fn test_distinct_questions_tracked_separately() {
        let tracker = FrequencyTracker::new(2);

        assert!(!tracker.record_and_check("first question"));
        assert!(!tracker.record_and_check("second question"));

        let stats = tracker.stats();
        assert_eq!(stats.unique_questions, 2);
        assert_eq!(stats.cached_questions, 0);
    }

    #[test]
    fn test_is_cached_never_reverts() {
        let tracker = FrequencyTracker::new(1);
        assert!(tracker.record_and_check("q"));

        let top = tracker.top_questions(1);
        assert!(top[0].is_cached);
        assert_eq!(top[0].ask_count, 1);

        tracker.record_and_check("q");
        let top = tracker.top_questions(1);
        assert!(top[0].is_cached);
        assert_eq!(top[0].ask_count, 2);
    }

    #[test]
    fn test_top_questions_ordering() {
        let tracker = FrequencyTracker::new(10);
        for _ in 0..3 {
            tracker.record_and_check("popular question");
        }
        tracker.record_and_check("rare question");

        let top = tracker.top_questions(2);
        assert_eq!(top[0].normalized_question, "popular question");
        assert_eq!(top[0].ask_count, 3);
        assert_eq!(top[1].ask_count, 1);
    }

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  What IS   the refund;  policy?! "),
            "what is the refund policy"
        );
    }
}
