//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hayrick",
    version,
    author = "neur0map",
    about = "Hybrid retrieval engine for RAG backends",
    long_about = "Hayrick chunks raw documents, indexes them in an in-memory BM25 index and an \
                  external vector store, fuses both retrieval signals with Reciprocal Rank \
                  Fusion, optionally re-ranks candidates, and answers questions with \
                  frequency- and quality-gated caching around the expensive model calls."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/hayrick/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a document: chunk, embed, upsert and index it
    Ingest {
        /// Path to a plain-text file to ingest
        file: PathBuf,

        /// Document id (defaults to the file stem)
        #[arg(short, long)]
        document_id: Option<String>,

        /// Categories to tag the document with
        #[arg(short = 't', long = "category")]
        categories: Vec<String>,
    },

    /// Retrieve fused results for a query without generating an answer
    Query {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Restrict results to a category
        #[arg(short = 't', long)]
        category: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ask a question over the indexed corpus
    Ask {
        /// Question to ask
        question: String,

        /// Number of context chunks to retrieve
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Restrict retrieval to a category
        #[arg(short = 't', long)]
        category: Option<String>,
    },

    /// Remove all chunks of a document
    Remove {
        /// Document id to remove
        document_id: String,
    },

    /// Show index and cache statistics
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
