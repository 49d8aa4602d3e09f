//! In-memory lexical indexing
//!
//! The BM25 inverted index is the only component in the engine with shared
//! mutable state; callers wrap it in a reader-writer lock (readers for
//! `search`, an exclusive writer for every mutation) so scoring never
//! observes a half-applied update.

mod bm25;

pub use bm25::{Bm25Hit, Bm25Index, IndexStats};
