//! Document ingestion handlers

use crate::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use querybridge_common::{
    errors::{AppError, Result},
    types::{ConnectionId, FileOutcome, IngestionJob},
};
use querybridge_ingestion::pipeline::RejectedFile;
use querybridge_ingestion::RawFile;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub status: String,
    pub accepted: usize,
    pub rejected: Vec<RejectedFile>,
}

/// Upload a batch of documents for asynchronous ingestion. The response
/// returns immediately with the job id; progress is polled via
/// `/api/ingest/status/{job_id}`.
pub async fn upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut connection_string: Option<String> = None;
    let mut files: Vec<RawFile> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation {
        message: format!("malformed multipart body: {}", e),
        field: None,
    })? {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);

        match (name.as_deref(), file_name) {
            (Some("connection_string"), None) => {
                let value = field.text().await.map_err(|e| AppError::Validation {
                    message: format!("unreadable connection_string field: {}", e),
                    field: Some("connection_string".to_string()),
                })?;
                connection_string = Some(value);
            }
            (_, Some(file_name)) => {
                let bytes = field.bytes().await.map_err(|e| AppError::Validation {
                    message: format!("unreadable file {}: {}", file_name, e),
                    field: None,
                })?;
                files.push(RawFile {
                    file_name,
                    content: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let connection_string = connection_string.ok_or_else(|| AppError::MissingField {
        field: "connection_string".to_string(),
    })?;
    let connection = ConnectionId::from_connection_string(&connection_string)?;

    // Ingestion is owned by a connection profile, so the connection
    // must be discoverable
    state.registry.get_or_connect(&connection).await?;

    let outcome = state.pipeline.submit(connection, files).await?;

    Ok(Json(UploadResponse {
        job_id: outcome.job_id,
        status: "pending".to_string(),
        accepted: outcome.accepted,
        rejected: outcome.rejected,
    }))
}

#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub processed: usize,
    pub total: usize,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub files: Vec<FileOutcome>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<IngestionJob> for JobResponse {
    fn from(job: IngestionJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status.to_string(),
            processed: job.processed,
            total: job.total,
            progress_percent: job.progress_percent(),
            message: job.message,
            files: job.files,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Poll one job's status
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>> {
    let job = state
        .tracker
        .get(job_id)
        .await
        .ok_or_else(|| AppError::JobNotFound {
            id: job_id.to_string(),
        })?;

    Ok(Json(JobResponse::from(job)))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub connection_string: Option<String>,
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
}

/// List jobs, optionally narrowed to one connection. Useful to discover
/// the job id to poll.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<JobListResponse>> {
    let connection = params
        .connection_string
        .as_deref()
        .map(ConnectionId::from_connection_string)
        .transpose()?;

    let jobs = state.tracker.list(connection.as_ref()).await;
    Ok(Json(JobListResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
    }))
}
