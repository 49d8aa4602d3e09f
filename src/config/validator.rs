use crate::config::Config;
use crate::error::{HayrickError, Result, ValidationError};

const RERANK_PROVIDERS: &[&str] = &["local", "cohere", "jina", "llm"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_endpoints(config, &mut errors);
        Self::validate_performance(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HayrickError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let c = &config.chunking;
        if c.max_chars == 0 {
            errors.push(ValidationError::new(
                "chunking.max_chars",
                "max_chars must be greater than 0",
            ));
        }
        if c.min_chars > c.max_chars {
            errors.push(ValidationError::new(
                "chunking.min_chars",
                format!(
                    "min_chars ({}) must not exceed max_chars ({})",
                    c.min_chars, c.max_chars
                ),
            ));
        }
        if c.overlap_chars >= c.max_chars && c.max_chars > 0 {
            errors.push(ValidationError::new(
                "chunking.overlap_chars",
                format!(
                    "overlap_chars ({}) must be smaller than max_chars ({})",
                    c.overlap_chars, c.max_chars
                ),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;
        if r.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }
        if r.search_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                "search_multiplier must be greater than 0",
            ));
        }
        if r.dense_weight <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.dense_weight",
                "dense_weight must be positive",
            ));
        }
        if r.sparse_weight <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.sparse_weight",
                "sparse_weight must be positive",
            ));
        }
        if r.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                "rrf_k must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&r.min_relevance_score) {
            errors.push(ValidationError::new(
                "retrieval.min_relevance_score",
                format!(
                    "min_relevance_score must be between 0.0 and 1.0, got {}",
                    r.min_relevance_score
                ),
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.rerank;
        if !RERANK_PROVIDERS.contains(&r.provider.as_str()) {
            errors.push(ValidationError::new(
                "rerank.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    RERANK_PROVIDERS, r.provider
                ),
            ));
        }

        if r.enabled {
            if r.candidate_count == 0 {
                errors.push(ValidationError::new(
                    "rerank.candidate_count",
                    "candidate_count must be greater than 0 when reranking is enabled",
                ));
            }

            // Hosted providers need a key in the environment
            if matches!(r.provider.as_str(), "cohere" | "jina") {
                match std::env::var(&r.api_key_env) {
                    Ok(key) if !key.is_empty() => {}
                    Ok(_) => errors.push(ValidationError::new(
                        "rerank.api_key_env",
                        format!("Environment variable {} is empty", r.api_key_env),
                    )),
                    Err(_) => errors.push(ValidationError::new(
                        "rerank.api_key_env",
                        format!("Environment variable {} is not set", r.api_key_env),
                    )),
                }
            }
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        let c = &config.cache;
        if c.question_threshold == 0 {
            errors.push(ValidationError::new(
                "cache.question_threshold",
                "question_threshold must be at least 1",
            ));
        }
        if c.answer_capacity == 0 {
            errors.push(ValidationError::new(
                "cache.answer_capacity",
                "answer_capacity must be greater than 0",
            ));
        }
        if c.embedding_capacity == 0 {
            errors.push(ValidationError::new(
                "cache.embedding_capacity",
                "embedding_capacity must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&c.min_cacheable_score) {
            errors.push(ValidationError::new(
                "cache.min_cacheable_score",
                format!(
                    "min_cacheable_score must be between 0.0 and 1.0, got {}",
                    c.min_cacheable_score
                ),
            ));
        }
    }

    fn validate_endpoints(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.base_url.is_empty() {
            errors.push(ValidationError::new(
                "embedding.base_url",
                "Embedding base URL cannot be empty",
            ));
        }
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Embedding model cannot be empty",
            ));
        }
        if config.completion.base_url.is_empty() {
            errors.push(ValidationError::new(
                "completion.base_url",
                "Completion base URL cannot be empty",
            ));
        }
        if config.completion.model.is_empty() {
            errors.push(ValidationError::new(
                "completion.model",
                "Completion model cannot be empty",
            ));
        }
        if config.vector_store.base_url.is_empty() {
            errors.push(ValidationError::new(
                "vector_store.base_url",
                "Vector store base URL cannot be empty",
            ));
        }
        if config.vector_store.collection.is_empty() {
            errors.push(ValidationError::new(
                "vector_store.collection",
                "Vector store collection cannot be empty",
            ));
        }
        if config.vector_store.vector_size == 0 {
            errors.push(ValidationError::new(
                "vector_store.vector_size",
                "Vector size must be greater than 0",
            ));
        }
    }

    fn validate_performance(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.performance.ingest_batch_size == 0 {
            errors.push(ValidationError::new(
                "performance.ingest_batch_size",
                "ingest_batch_size must be greater than 0",
            ));
        }
        if config.performance.max_concurrent_embeddings == 0 {
            errors.push(ValidationError::new(
                "performance.max_concurrent_embeddings",
                "max_concurrent_embeddings must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_chunking() {
        let mut config = Config::default();
        config.chunking.min_chars = config.chunking.max_chars + 1;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_weights() {
        let mut config = Config::default();
        config.retrieval.sparse_weight = 0.0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_rerank_provider() {
        let mut config = Config::default();
        config.rerank.provider = "mystery".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_question_threshold() {
        let mut config = Config::default();
        config.cache.question_threshold = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        config.cache.answer_capacity = 0;
        config.embedding.model = String::new();

        match ConfigValidator::validate(&config) {
            Err(HayrickError::ConfigValidation { errors }) => {
                assert!(errors.len() >= 3);
            }
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }
}
