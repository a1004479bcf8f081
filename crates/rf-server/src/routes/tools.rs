use axum::extract::State;
use axum::Json;

use crate::context::AppContext;

/// GET /api/tools
#[utoipa::path(
    get,
    path = "/api/tools",
    responses((status = 200, description = "External tool availability", body = Vec<rf_av::ToolInfo>))
)]
pub async fn tools(State(ctx): State<AppContext>) -> Json<Vec<rf_av::ToolInfo>> {
    Json(ctx.tools.check_all().await)
}
