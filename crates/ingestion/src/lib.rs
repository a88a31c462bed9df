//! QueryBridge Ingestion Pipeline
//!
//! Turns uploaded files into embedded document chunks:
//! 1. Validates file formats against the extractor registry
//! 2. Creates an ingestion job and returns its id immediately
//! 3. A detached worker extracts text, splits it into adaptively sized
//!    chunks, embeds them, and upserts into the vector store
//! 4. The caller polls job status; skipped and failed files land in job
//!    metadata instead of failing the batch

pub mod chunker;
pub mod errors;
pub mod extract;
pub mod jobs;
pub mod pipeline;

pub use chunker::{chunk_document, chunk_text, ChunkingConfig, DocumentKind, TextChunk};
pub use errors::IngestionError;
pub use extract::{ExtractorRegistry, TextExtractor};
pub use jobs::JobTracker;
pub use pipeline::{IngestionPipeline, RawFile};
