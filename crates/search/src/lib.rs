//! QueryBridge Vector Store
//!
//! Holds chunk embeddings scoped to a connection and serves
//! nearest-neighbor semantic search:
//! - Upsert replaces by chunk id without disturbing creation order
//! - Search returns the top-k by cosine similarity, ties broken by
//!   creation order (earlier first) for determinism
//! - Readers and writers proceed concurrently; a reader sees either the
//!   pre- or post-upsert state of a chunk, never a torn embedding

pub mod similarity;
pub mod store;

pub use similarity::cosine_similarity;
pub use store::{ScoredChunk, SearchFilter, VectorStore};
