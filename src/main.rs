use std::sync::Arc;

use hayrick::chunk::Chunker;
use hayrick::cli::{Cli, Commands, ConfigAction};
use hayrick::config::Config;
use hayrick::error::{HayrickError, Result};
use hayrick::provider::{OpenAiChatClient, OpenAiEmbeddingsClient, QdrantStore};
use hayrick::retrieval::{
    EngineSettings, FusionEngine, RagEngine, RerankBackend, Reranker,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Ingest {
            file,
            document_id,
            categories,
        } => {
            let engine = build_engine(cli.config)?;

            let document_id = document_id.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string())
            });

            let text = std::fs::read_to_string(&file).map_err(|e| HayrickError::Io {
                source: e,
                context: format!("Failed to read document: {:?}", file),
            })?;

            let count = engine
                .ingest_document(&document_id, &text, &categories)
                .await?;
            println!("✓ Ingested {} as {} chunks", document_id, count);
        }
        Commands::Query {
            query,
            limit,
            category,
            json,
        } => {
            let engine = build_engine(cli.config)?;
            let results = engine
                .retrieve(&query, limit, category.as_deref())
                .await?;

            if json {
                let out: Vec<serde_json::Value> = results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "id": r.id,
                            "documentId": r.document_id,
                            "chunkIndex": r.chunk_index,
                            "fusedScore": r.fused_score,
                            "denseScore": r.dense_score,
                            "sparseScore": r.sparse_score,
                            "inDense": r.in_dense,
                            "inSparse": r.in_sparse,
                            "text": r.text,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
            } else {
                println!("Top {} results for: {}", results.len(), query);
                for (i, r) in results.iter().enumerate() {
                    let signals = match (r.in_dense, r.in_sparse) {
                        (true, true) => "dense+sparse",
                        (true, false) => "dense",
                        (false, true) => "sparse",
                        (false, false) => "-",
                    };
                    println!(
                        "  {}. [{}#{}] score={:.4} ({})",
                        i + 1,
                        r.document_id,
                        r.chunk_index,
                        r.fused_score,
                        signals
                    );
                    println!("     {}", preview(&r.text, 120));
                }
            }
        }
        Commands::Ask {
            question,
            limit,
            category,
        } => {
            let engine = build_engine(cli.config)?;
            let result = engine
                .answer(&question, limit, category.as_deref())
                .await?;

            println!("{}", result.answer);
            if !result.sources.is_empty() {
                println!("\nSources:");
                for s in &result.sources {
                    println!(
                        "  - {}#{} (score {:.3})",
                        s.document_id, s.chunk_index, s.relevance_score
                    );
                }
            }
        }
        Commands::Remove { document_id } => {
            let engine = build_engine(cli.config)?;
            let removed = engine.remove_document(&document_id).await?;
            println!("✓ Removed {} chunks for {}", removed, document_id);
        }
        Commands::Stats => {
            let engine = build_engine(cli.config)?;
            let index = engine.index_stats().await;
            let frequency = engine.frequency_stats();

            println!("Hayrick Stats");
            println!("=============");
            println!("\nLexical index:");
            println!("  Chunks:           {}", index.total_chunks);
            println!("  Vocabulary:       {}", index.vocabulary_size);
            println!("  Avg chunk length: {:.1} tokens", index.average_document_length);
            println!("\nCaches:");
            println!("  Unique questions: {}", frequency.unique_questions);
            println!("  Total asks:       {}", frequency.total_asks);
            println!("  Cache-eligible:   {}", frequency.cached_questions);
            println!("  Cached answers:   {}", engine.cached_answers());
            println!("  Cached embeddings: {}", engine.cached_embeddings());
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hayrick=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = config_path.unwrap_or_else(|| Config::default_path().unwrap());

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'hayrick config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

/// Wire providers and engine from configuration
fn build_engine(config_path: Option<std::path::PathBuf>) -> Result<RagEngine> {
    let config = load_config(config_path)?;

    let embedder = Arc::new(OpenAiEmbeddingsClient::new(
        &config.embedding.base_url,
        &config.embedding.model,
        api_key_from_env(&config.embedding.api_key_env),
    ));
    let completion = Arc::new(OpenAiChatClient::new(
        &config.completion.base_url,
        &config.completion.model,
        api_key_from_env(&config.completion.api_key_env),
    ));
    let vector_store = Arc::new(QdrantStore::new(
        &config.vector_store.base_url,
        &config.vector_store.collection,
        config.vector_store.vector_size,
        &config.vector_store.distance,
    ));

    let chunker = Chunker::new(
        config.chunking.max_chars,
        config.chunking.overlap_chars,
        config.chunking.min_chars,
    );
    let fusion = FusionEngine::new(config.retrieval.rrf_k);
    let reranker = build_reranker(&config, completion.clone());

    Ok(RagEngine::new(
        chunker,
        fusion,
        reranker,
        embedder,
        vector_store,
        completion,
        config.cache.question_threshold,
        config.cache.answer_capacity,
        config.cache.embedding_capacity,
        EngineSettings::from_config(&config),
    ))
}

fn build_reranker(config: &Config, completion: Arc<OpenAiChatClient>) -> Reranker {
    if !config.rerank.enabled {
        return Reranker::disabled();
    }

    let backend = match config.rerank.provider.as_str() {
        "cohere" => RerankBackend::Cohere {
            api_key: api_key_from_env(&config.rerank.api_key_env).unwrap_or_default(),
            model: config.rerank.model.clone(),
        },
        "jina" => RerankBackend::Jina {
            api_key: api_key_from_env(&config.rerank.api_key_env).unwrap_or_default(),
            model: config.rerank.model.clone(),
        },
        "llm" => RerankBackend::Llm { completion },
        _ => RerankBackend::Local {
            base_url: config.rerank.base_url.clone(),
            model: config.rerank.model.clone(),
        },
    };

    Reranker::new(
        backend,
        config.rerank.min_score,
        config.rerank.candidate_count,
    )
}

fn api_key_from_env(env_var: &str) -> Option<String> {
    if env_var.is_empty() {
        return None;
    }
    std::env::var(env_var).ok().filter(|k| !k.is_empty())
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| HayrickError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = file.unwrap_or_else(|| Config::default_path().unwrap());
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| HayrickError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let prefix: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", prefix)
}
