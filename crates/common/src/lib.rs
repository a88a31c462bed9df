//! QueryBridge Common Library
//!
//! Shared code for the QueryBridge engine crates including:
//! - Core domain types (connection identity, jobs, chunks, query results)
//! - Response cache with TTL and fingerprinting
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod types;

// Re-export commonly used types
pub use cache::{Fingerprint, ResponseCache};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use types::{ConnectionId, DocumentChunk, IngestionJob, JobStatus, QueryResponse, QueryType};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
