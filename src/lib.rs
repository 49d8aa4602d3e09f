//! Hayrick - Hybrid Retrieval Engine for RAG Backends
//!
//! Turns raw documents into overlapping chunks, indexes them in an in-memory
//! BM25 index alongside an external vector store, fuses both ranked lists with
//! Reciprocal Rank Fusion, optionally re-ranks the candidates, and gates the
//! expensive embedding and completion calls behind frequency- and
//! quality-aware caches.

pub mod cache;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod provider;
pub mod retrieval;

pub use error::{HayrickError, Result};
