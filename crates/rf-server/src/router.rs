//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, put};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::jobs::submit_job,
        routes::jobs::list_jobs,
        routes::jobs::get_job,
        routes::jobs::delete_job,
        routes::jobs::download_job,
        routes::media::upload_media,
        routes::tools::tools,
    ),
    components(schemas(
        rf_core::ExportRequest,
        rf_core::Project,
        rf_core::RenderSettings,
        rf_core::RenderParams,
        rf_core::ErrorCode,
        rf_jobs::JobStatus,
        rf_jobs::QueueStats,
        rf_jobs::DebugEntry,
        rf_media::UploadOutcome,
        rf_av::ToolInfo,
        routes::jobs::SubmitResponse,
        routes::jobs::JobResponse,
        routes::jobs::ListJobsResponse,
        routes::health::HealthResponse,
    ))
)]
pub struct ApiDoc;

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload = ctx.config.server.max_upload_bytes;

    let api = Router::new()
        // Jobs
        .route(
            "/jobs",
            get(routes::jobs::list_jobs).post(routes::jobs::submit_job),
        )
        .route(
            "/jobs/{id}",
            get(routes::jobs::get_job).delete(routes::jobs::delete_job),
        )
        .route("/jobs/{id}/download", get(routes::jobs::download_job))
        // Media
        .route(
            "/media/{hash}",
            put(routes::media::upload_media).layer(DefaultBodyLimit::max(max_upload)),
        )
        // Tools
        .route("/tools", get(routes::tools::tools));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
