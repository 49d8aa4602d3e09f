//! Configuration management
//!
//! TOML-backed configuration with environment variable overrides and a
//! validation pass that collects every failure instead of stopping at the
//! first.

use crate::error::{HayrickError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub cache: CacheConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub vector_store: VectorStoreConfig,
    pub performance: PerformanceConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub min_chars: usize,
    pub overlap_chars: usize,
}

/// Retrieval and fusion parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Both signals fetch top_k * search_multiplier candidates before fusion
    pub search_multiplier: usize,
    pub min_relevance_score: f64,
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub rrf_k: f64,
}

/// Rerank stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub enabled: bool,
    /// One of "local", "cohere", "jina", "llm"
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub candidate_count: usize,
    pub min_score: f64,
}

/// Cache gates and capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Asks required before a question becomes cache-eligible
    pub question_threshold: u64,
    pub answer_capacity: usize,
    pub embedding_capacity: usize,
    /// Top-source score floor for answer cache admission
    pub min_cacheable_score: f64,
}

/// Embedding service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: String,
}

/// Completion service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: String,
}

/// Vector store endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub base_url: String,
    pub collection: String,
    pub vector_size: usize,
    pub distance: String,
}

/// Ingestion throughput knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub ingest_batch_size: usize,
    pub max_concurrent_embeddings: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HayrickError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| HayrickError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| HayrickError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: HAYRICK_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("HAYRICK_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k = parse_env(path, value)?;
            }
            "RETRIEVAL__DENSE_WEIGHT" => {
                self.retrieval.dense_weight = parse_env(path, value)?;
            }
            "RETRIEVAL__SPARSE_WEIGHT" => {
                self.retrieval.sparse_weight = parse_env(path, value)?;
            }
            "RERANK__ENABLED" => {
                self.rerank.enabled = parse_env(path, value)?;
            }
            "RERANK__PROVIDER" => {
                self.rerank.provider = value.to_string();
            }
            "EMBEDDING__BASE_URL" => {
                self.embedding.base_url = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "COMPLETION__BASE_URL" => {
                self.completion.base_url = value.to_string();
            }
            "COMPLETION__MODEL" => {
                self.completion.model = value.to_string();
            }
            "VECTOR_STORE__BASE_URL" => {
                self.vector_store.base_url = value.to_string();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| HayrickError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("hayrick").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| HayrickError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            chunking: ChunkingConfig {
                max_chars: 1200,
                min_chars: 50,
                overlap_chars: 120,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                search_multiplier: 2,
                min_relevance_score: 0.75,
                dense_weight: 0.7,
                sparse_weight: 0.3,
                rrf_k: 60.0,
            },
            rerank: RerankConfig {
                enabled: false,
                provider: "local".to_string(),
                base_url: "http://localhost:8001".to_string(),
                model: "bge-reranker-base".to_string(),
                api_key_env: "RERANK_API_KEY".to_string(),
                candidate_count: 50,
                min_score: 0.0,
            },
            cache: CacheConfig {
                question_threshold: 2,
                answer_capacity: 500,
                embedding_capacity: 2000,
                min_cacheable_score: 0.65,
            },
            embedding: EmbeddingConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "nomic-embed-text".to_string(),
                api_key_env: String::new(),
            },
            completion: CompletionConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.1".to_string(),
                api_key_env: String::new(),
            },
            vector_store: VectorStoreConfig {
                base_url: "http://localhost:6333".to_string(),
                collection: "hayrick_chunks".to_string(),
                vector_size: 768,
                distance: "Cosine".to_string(),
            },
            performance: PerformanceConfig {
                ingest_batch_size: 64,
                max_concurrent_embeddings: 4,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, config.retrieval.top_k);
        assert_eq!(loaded.chunking.max_chars, config.chunking.max_chars);
        assert_eq!(loaded.cache.question_threshold, 2);
        assert_eq!(loaded.vector_store.collection, "hayrick_chunks");
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.toml");

        let result = Config::load(&path);
        assert!(matches!(result, Err(HayrickError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.dense_weight = -1.0;
        config.save(&path).unwrap();

        let result = Config::load(&path);
        assert!(matches!(
            result,
            Err(HayrickError::ConfigValidation { .. })
        ));
    }
}
