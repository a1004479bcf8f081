//! Export job route handlers.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use rf_core::{Container, Error, ErrorCode, ExportRequest, JobId, RenderParams};
use rf_jobs::{DebugEntry, Job, JobStatus, QueueStats};

use crate::context::AppContext;
use crate::error::AppError;

/// Response to a successful submission.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Job status as seen by clients.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub status: JobStatus,
    /// `null` while queued.
    pub progress: Option<f64>,
    pub error: Option<ErrorCode>,
    pub error_message: Option<String>,
    /// Present only when the job is complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub container: Container,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub params: Option<RenderParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    /// Diagnostic trail, only when debug responses are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Vec<DebugEntry>>,
}

impl JobResponse {
    pub fn from_job(job: &Job, include_debug: bool) -> Self {
        let download_url = (job.status == JobStatus::Complete)
            .then(|| format!("/api/jobs/{}/download", job.id));
        Self {
            id: job.id.to_string(),
            status: job.status,
            progress: job.visible_progress(),
            error: job.error.as_ref().map(|e| e.code),
            error_message: job.error.as_ref().map(|e| e.message.clone()),
            download_url,
            container: job.container,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            params: job.params,
            client_version: job.client_version.clone(),
            debug: include_debug.then(|| job.debug.entries().cloned().collect()),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
    pub stats: QueueStats,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsParams {
    /// One of queued, rendering, complete, failed, cancelled.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct DeleteJobParams {
    /// Remove the record now instead of marking it cancelled.
    #[serde(default)]
    pub purge: bool,
}

/// Unknown and malformed ids are both reported as not found.
fn parse_job_id(id: &str) -> Result<JobId, AppError> {
    id.parse()
        .map_err(|_| AppError(Error::not_found("job", id)))
}

/// Filename offered for a job's download.
pub fn download_filename(id: JobId, container: Container) -> String {
    format!("export-{id}.{}", container.extension())
}

/// POST /api/jobs
#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = ExportRequest,
    responses(
        (status = 202, description = "Job accepted; poll its status", body = SubmitResponse),
        (status = 400, description = "Malformed submission")
    )
)]
pub async fn submit_job(
    State(ctx): State<AppContext>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) =
        payload.map_err(|e| Error::Validation(format!("invalid submission body: {e}")))?;

    let (id, admission) = ctx.jobs.submit(request)?;
    tracing::debug!(job_id = %id, ?admission, "Export submitted");

    let status = ctx
        .jobs
        .get(&id)
        .map(|j| j.status)
        .unwrap_or(JobStatus::Queued);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: id.to_string(),
            status,
        }),
    ))
}

/// GET /api/jobs
#[utoipa::path(
    get,
    path = "/api/jobs",
    params(ListJobsParams),
    responses(
        (status = 200, description = "Jobs, oldest first, with queue statistics", body = ListJobsResponse)
    )
)]
pub async fn list_jobs(
    State(ctx): State<AppContext>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()?;

    let debug = ctx.config.server.debug_responses;
    let jobs = ctx
        .jobs
        .list(status)
        .iter()
        .map(|j| JobResponse::from_job(j, debug))
        .collect();

    Ok(Json(ListJobsResponse {
        jobs,
        stats: ctx.jobs.stats(),
    }))
}

/// GET /api/jobs/:id
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job status", body = JobResponse),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id = parse_job_id(&id)?;
    let job = ctx
        .jobs
        .get(&job_id)
        .ok_or_else(|| Error::not_found("job", job_id))?;
    Ok(Json(JobResponse::from_job(
        &job,
        ctx.config.server.debug_responses,
    )))
}

/// DELETE /api/jobs/:id
#[utoipa::path(
    delete,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID"), DeleteJobParams),
    responses(
        (status = 200, description = "Job cancelled (or already finished)", body = JobResponse),
        (status = 204, description = "Job purged"),
        (status = 404, description = "Job not found")
    )
)]
pub async fn delete_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<DeleteJobParams>,
) -> Result<Response, AppError> {
    let job_id = parse_job_id(&id)?;

    if params.purge {
        ctx.jobs.remove(&job_id)?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let job = ctx.jobs.cancel(&job_id)?;
    Ok(Json(JobResponse::from_job(&job, ctx.config.server.debug_responses)).into_response())
}

/// GET /api/jobs/:id/download
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/download",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Rendered file", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown job, not complete, or file gone")
    )
)]
pub async fn download_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job_id = parse_job_id(&id)?;
    let (path, container) = ctx.jobs.download(&job_id)?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Error::not_found("export file", job_id))?;
    let size = file.metadata().await.map_err(Error::from)?.len();

    let stream = ReaderStream::with_capacity(file, 64 * 1024);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download_filename(job_id, container)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE.as_str(), container.content_type().to_string()),
            (header::CONTENT_LENGTH.as_str(), size.to_string()),
            (header::CONTENT_DISPOSITION.as_str(), disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn queued_job_has_null_progress_and_no_download() {
        let job = Job::new(Container::Webm, Some("2.1.0".into()), 10);
        let json = serde_json::to_value(JobResponse::from_job(&job, false)).unwrap();
        assert_eq!(json["status"], "queued");
        assert!(json["progress"].is_null());
        assert!(json["error"].is_null());
        assert!(json.get("downloadUrl").is_none());
        assert!(json.get("debug").is_none());
        assert_eq!(json["clientVersion"], "2.1.0");
        assert_eq!(json["container"], "webm");
    }

    #[test]
    fn complete_job_links_download() {
        let mut job = Job::new(Container::Mp4, None, 10);
        job.start();
        job.complete(PathBuf::from("/tmp/out.mp4"));
        let json = serde_json::to_value(JobResponse::from_job(&job, true)).unwrap();
        assert_eq!(json["progress"], 100.0);
        assert_eq!(json["downloadUrl"], format!("/api/jobs/{}/download", job.id));
        assert!(json["debug"].as_array().is_some_and(|d| !d.is_empty()));
    }

    #[test]
    fn filename_depends_only_on_id_and_container() {
        let id = JobId::new();
        assert_eq!(download_filename(id, Container::Mov), format!("export-{id}.mov"));
        assert_eq!(
            download_filename(id, Container::Mov),
            download_filename(id, Container::Mov)
        );
    }
}
