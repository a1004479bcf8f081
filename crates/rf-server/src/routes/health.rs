use axum::extract::State;
use axum::Json;
use serde::Serialize;

use rf_jobs::QueueStats;

use crate::context::AppContext;

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub encoder: String,
    pub ffmpeg_available: bool,
    pub queue: QueueStats,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        encoder: ctx.jobs.encoder_name().to_string(),
        ffmpeg_available: ctx.tools.is_available("ffmpeg"),
        queue: ctx.jobs.stats(),
    })
}
