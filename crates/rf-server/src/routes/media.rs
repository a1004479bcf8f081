//! Content-addressed media upload.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;

use rf_media::UploadOutcome;

use crate::context::AppContext;
use crate::error::AppError;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct UploadParams {
    /// Original filename, used only to pick the stored extension.
    pub name: Option<String>,
}

/// PUT /api/media/:hash
///
/// Body is the raw file. The hash is the hex SHA-256 the client computed.
#[utoipa::path(
    put,
    path = "/api/media/{hash}",
    params(("hash" = String, Path, description = "Hex SHA-256 of the body"), UploadParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Stored", body = UploadOutcome),
        (status = 200, description = "Already stored", body = UploadOutcome),
        (status = 400, description = "Hash mismatch or malformed hash")
    )
)]
pub async fn upload_media(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let outcome = ctx.media.store(&hash, params.name.as_deref(), body).await?;

    let status = match outcome {
        UploadOutcome::Stored { .. } => StatusCode::CREATED,
        UploadOutcome::Cached { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
