//! Asynchronous ingestion pipeline
//!
//! `submit` validates the batch, creates a job, and returns the job id
//! immediately; a detached worker does the rest. Files within a job are
//! processed concurrently with a bounded width. Per-file problems
//! (unparseable, empty, embedding exhausted) become skip/fail outcomes in
//! job metadata; only a storage fault fails the job itself.

use crate::chunker::{chunk_document, infer_document_kind, ChunkingConfig};
use crate::errors::IngestionError;
use crate::extract::ExtractorRegistry;
use crate::jobs::JobTracker;
use backoff::ExponentialBackoff;
use futures::stream::{self, StreamExt};
use querybridge_common::config::IngestionConfig;
use querybridge_common::embeddings::Embedder;
use querybridge_common::errors::{AppError, Result};
use querybridge_common::metrics;
use querybridge_common::types::{
    ConnectionId, DocumentChunk, FileDisposition, FileOutcome, JobStatus,
};
use querybridge_search::VectorStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// An uploaded file: name plus raw bytes
#[derive(Debug, Clone)]
pub struct RawFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// A file rejected at validation, before the job was queued
#[derive(Debug, Clone, Serialize)]
pub struct RejectedFile {
    pub file_name: String,
    pub reason: String,
}

/// Result of submitting a batch
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    /// Files accepted into the job
    pub accepted: usize,
    /// Files rejected at validation; the job never includes them
    pub rejected: Vec<RejectedFile>,
}

/// The document ingestion pipeline
#[derive(Clone)]
pub struct IngestionPipeline {
    registry: Arc<ExtractorRegistry>,
    tracker: Arc<JobTracker>,
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: Arc<IngestionConfig>,
    embed_batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        registry: Arc<ExtractorRegistry>,
        tracker: Arc<JobTracker>,
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: IngestionConfig,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            registry,
            tracker,
            store,
            embedder,
            config: Arc::new(config),
            embed_batch_size: embed_batch_size.max(1),
        }
    }

    /// Validate a batch and queue it for ingestion. Returns immediately
    /// with the job id; callers poll job status for progress.
    ///
    /// Unsupported extensions are rejected here, per file; the job only
    /// ever counts supported files. A batch with nothing supported is a
    /// validation error and no job is queued.
    #[instrument(skip(self, files), fields(connection = %connection))]
    pub async fn submit(&self, connection: ConnectionId, files: Vec<RawFile>) -> Result<SubmitOutcome> {
        if files.is_empty() {
            return Err(AppError::validation("no files provided"));
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for file in files {
            if self.registry.is_supported(&file.file_name) {
                accepted.push(file);
            } else {
                rejected.push(RejectedFile {
                    file_name: file.file_name.clone(),
                    reason: format!(
                        "unsupported extension (supported: {})",
                        self.registry.supported_extensions().join(", ")
                    ),
                });
            }
        }

        if accepted.is_empty() {
            return Err(AppError::UnsupportedFormat {
                file_name: rejected
                    .first()
                    .map(|r| r.file_name.clone())
                    .unwrap_or_default(),
            });
        }

        let job = self.tracker.create(connection.clone(), accepted.len()).await;
        info!(job_id = %job.id, accepted = accepted.len(), rejected = rejected.len(), "Ingestion job queued");

        let pipeline = self.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            pipeline.run_job(job_id, connection, accepted).await;
        });

        Ok(SubmitOutcome {
            job_id,
            accepted: job.total,
            rejected,
        })
    }

    #[instrument(skip(self, files), fields(job_id = %job_id, connection = %connection))]
    async fn run_job(self, job_id: Uuid, connection: ConnectionId, files: Vec<RawFile>) {
        let start = Instant::now();
        self.tracker.set_status(job_id, JobStatus::InProgress, None).await;

        let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(files.len());
        let mut job_fault: Option<IngestionError> = None;

        {
            let mut in_flight = stream::iter(files.into_iter().map(|file| {
                let pipeline = self.clone();
                let connection = connection.clone();
                async move {
                    let result = pipeline.process_file(job_id, &connection, file).await;
                    if let Ok(ref outcome) = result {
                        metrics::record_file(disposition_label(outcome.disposition));
                        pipeline.tracker.record_file(job_id, outcome.clone()).await;
                    }
                    result
                }
            }))
            .buffer_unordered(self.config.max_concurrent_files.max(1));

            while let Some(result) = in_flight.next().await {
                match result {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => {
                        // Job-level fault: stop consuming further work
                        job_fault = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(fault) = job_fault {
            warn!(job_id = %job_id, error = %fault, "Ingestion job failed");
            self.tracker
                .set_status(job_id, JobStatus::Failed, Some(fault.to_string()))
                .await;
            return;
        }

        let indexed = count(&outcomes, FileDisposition::Indexed);
        let skipped = count(&outcomes, FileDisposition::Skipped);
        let failed = count(&outcomes, FileDisposition::Failed);
        let chunks: usize = outcomes.iter().map(|o| o.chunks).sum();

        let summary = format!(
            "indexed {} file(s), skipped {}, failed {} ({} chunks)",
            indexed, skipped, failed, chunks
        );
        info!(job_id = %job_id, %summary, "Ingestion job complete");

        self.tracker
            .set_status(job_id, JobStatus::Completed, Some(summary))
            .await;
        metrics::record_ingestion(start.elapsed().as_secs_f64(), chunks);
    }

    /// Process one file end to end. `Ok` outcomes cover success, skip,
    /// and per-file failure; `Err` is reserved for job-level faults.
    async fn process_file(
        &self,
        job_id: Uuid,
        connection: &ConnectionId,
        file: RawFile,
    ) -> std::result::Result<FileOutcome, IngestionError> {
        let RawFile { file_name, content } = file;

        let text = match self.registry.extract(&file_name, &content) {
            Ok(text) => text,
            Err(e) => {
                // Unparseable content skips the file, not the job
                return Ok(skip(&file_name, e.to_string()));
            }
        };

        if text.trim().is_empty() {
            return Ok(skip(&file_name, "empty content".to_string()));
        }

        let chunking = ChunkingConfig::from(self.config.as_ref());
        let chunks = chunk_document(&text, &file_name, &chunking);
        if chunks.is_empty() {
            return Ok(skip(&file_name, "no chunks produced".to_string()));
        }

        let kind = infer_document_kind(&text, &file_name);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let (embeddings, failed_chunks) = self.embed_with_retry(&texts).await;

        if failed_chunks == chunks.len() {
            return Ok(FileOutcome {
                file_name,
                disposition: FileDisposition::Failed,
                detail: Some("embedding failed for every chunk".to_string()),
                chunks: 0,
            });
        }

        let document_chunks: Vec<DocumentChunk> = chunks
            .iter()
            .zip(embeddings)
            .filter_map(|(chunk, embedding)| {
                embedding.map(|embedding| DocumentChunk {
                    id: Uuid::new_v4(),
                    document_id: file_name.clone(),
                    job_id,
                    ordinal: chunk.index,
                    content: chunk.content.clone(),
                    embedding,
                    metadata: chunk_metadata(&file_name, kind.as_str()),
                })
            })
            .collect();
        let stored = document_chunks.len();

        // Storage unavailable is the job-level fault
        self.store.upsert(connection, document_chunks).await?;

        Ok(FileOutcome {
            file_name,
            disposition: FileDisposition::Indexed,
            detail: (failed_chunks > 0)
                .then(|| format!("{} chunk(s) dropped after embedding retries", failed_chunks)),
            chunks: stored,
        })
    }

    /// Embed chunk batches sequentially (ordinal order is preserved by
    /// construction), retrying each batch with exponential backoff inside
    /// a bounded budget. A batch that exhausts its budget marks its
    /// chunks failed and the file continues.
    async fn embed_with_retry(&self, texts: &[String]) -> (Vec<Option<Vec<f32>>>, usize) {
        let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut failed = 0usize;

        for batch in texts.chunks(self.embed_batch_size) {
            let policy = ExponentialBackoff {
                max_elapsed_time: Some(Duration::from_secs(self.config.embed_retry_budget_secs)),
                ..Default::default()
            };

            let started = Instant::now();
            let result = backoff::future::retry(policy, || async {
                self.embedder
                    .embed_batch(batch)
                    .await
                    .map_err(backoff::Error::transient)
            })
            .await;

            match result {
                Ok(vectors) => {
                    metrics::record_embedding(
                        started.elapsed().as_secs_f64(),
                        self.embedder.model_name(),
                    );
                    embeddings.extend(vectors.into_iter().map(Some));
                }
                Err(e) => {
                    warn!(error = %e, batch_len = batch.len(), "Embedding batch exhausted retries");
                    failed += batch.len();
                    embeddings.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
            }
        }

        (embeddings, failed)
    }
}

fn skip(file_name: &str, detail: String) -> FileOutcome {
    FileOutcome {
        file_name: file_name.to_string(),
        disposition: FileDisposition::Skipped,
        detail: Some(detail),
        chunks: 0,
    }
}

fn count(outcomes: &[FileOutcome], disposition: FileDisposition) -> usize {
    outcomes.iter().filter(|o| o.disposition == disposition).count()
}

fn disposition_label(disposition: FileDisposition) -> &'static str {
    match disposition {
        FileDisposition::Indexed => "indexed",
        FileDisposition::Skipped => "skipped",
        FileDisposition::Failed => "failed",
    }
}

fn chunk_metadata(file_name: &str, kind: &str) -> querybridge_common::types::JsonMap {
    let mut metadata = querybridge_common::types::JsonMap::new();
    metadata.insert(
        "file_name".to_string(),
        serde_json::Value::String(file_name.to_string()),
    );
    metadata.insert("kind".to_string(), serde_json::Value::String(kind.to_string()));
    metadata
}
