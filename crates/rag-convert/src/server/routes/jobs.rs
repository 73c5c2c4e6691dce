//! Asynchronous job submission, polling and deletion

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processing::{ConversionTask, JobId, JobRecord, JobStatus, JobSummary};
use crate::server::routes::convert::ChunkedParams;
use crate::server::state::AppState;
use crate::server::upload::read_single;
use crate::types::FileType;

/// Response from async submission
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub filename: String,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
}

/// Response from job deletion
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub job_id: JobId,
}

/// Response from job listing
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub total_jobs: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub worker_count: usize,
    pub jobs: Vec<JobSummary>,
}

/// Unknown and malformed identifiers are both "not found"
fn parse_job_id(raw: &str) -> Result<JobId> {
    Uuid::parse_str(raw).map_err(|_| Error::JobNotFound(raw.to_string()))
}

/// POST /convert-chunked-async - Accept an upload and queue it for chunking
pub async fn submit_job(
    State(state): State<AppState>,
    Query(params): Query<ChunkedParams>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>> {
    let upload = read_single(&mut multipart, "file").await?;
    let (_, extension) = FileType::from_filename(&upload.filename).map_err(|e| {
        tracing::warn!("Rejected {}: {}", upload.filename, e);
        e
    })?;
    let options = params.options()?;

    let workspaces = state.workspaces();
    let workspace = workspaces.allocate().await?;
    let path = match workspaces.store(&workspace, &upload.filename, &upload.data).await {
        Ok(path) => path,
        Err(e) => {
            workspace.release().await;
            return Err(e);
        }
    };

    let record = match state
        .store()
        .create(upload.filename.clone(), upload.size(), workspace.clone())
        .await
    {
        Ok(record) => record,
        Err(e) => {
            workspace.release().await;
            return Err(e);
        }
    };

    state
        .queue()
        .submit(ConversionTask {
            job_id: record.id,
            path,
            filename: upload.filename.clone(),
            extension,
            file_size: upload.size(),
            options,
            workspace,
        })
        .await?;

    tracing::info!(
        "[Job {}] Queued {} ({} bytes)",
        record.id,
        record.filename,
        record.file_size
    );

    Ok(Json(SubmitResponse {
        job_id: record.id,
        status: record.status,
        message: format!("Job accepted. Poll /job/{} for its status.", record.id),
        filename: record.filename,
        file_size: record.file_size,
        created_at: record.created_at,
    }))
}

/// GET /job/:id - Current status, with the result or error once finished
pub async fn get_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<JobRecord>> {
    let job_id = parse_job_id(&raw_id)?;
    let record = state.store().get(job_id).await.map_err(|e| {
        tracing::warn!("GET /job/{} - not found", raw_id);
        e
    })?;

    tracing::debug!(
        "GET /job/{} - {} ({}%)",
        job_id,
        record.status.as_str(),
        record.progress
    );
    Ok(Json(record))
}

/// DELETE /job/:id - Remove the job and release its workspace
pub async fn delete_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let job_id = parse_job_id(&raw_id)?;
    let record = state.store().delete(job_id).await?;

    tracing::info!("[Job {}] Deleted ({})", job_id, record.status.as_str());
    Ok(Json(DeleteResponse {
        message: format!("Job {} deleted", job_id),
        job_id,
    }))
}

/// GET /jobs - Summaries of all jobs
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<JobListResponse>> {
    let jobs = state.store().list().await?;
    let counts = state.store().counts().await;

    Ok(Json(JobListResponse {
        total_jobs: jobs.len(),
        queued: counts.queued,
        processing: counts.processing,
        completed: counts.completed,
        failed: counts.failed,
        worker_count: state.worker_count(),
        jobs,
    }))
}
