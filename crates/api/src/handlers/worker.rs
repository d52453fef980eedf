use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{RequestPrincipal, PERM_VIEW_TASK},
    error::ApiResult,
    response::ApiResponse,
    routes::AppState,
    routing::ScenarioContext,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub scenario: String,
    pub alive: bool,
    pub holder: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// 当前场景的 Worker 存活状态
pub async fn worker_status(
    State(state): State<AppState>,
    context: ScenarioContext,
    principal: RequestPrincipal,
) -> ApiResult<Json<ApiResponse<WorkerStatus>>> {
    principal.require_permission(PERM_VIEW_TASK).await?;
    let record = state.registry.liveness(context.name()).await?.read().await?;

    let status = WorkerStatus {
        scenario: context.name().to_string(),
        alive: record
            .as_ref()
            .map(|r| r.is_fresh(Utc::now(), state.liveness_threshold))
            .unwrap_or(false),
        holder: record.as_ref().map(|r| r.holder.clone()),
        last_heartbeat: record.map(|r| r.last_heartbeat),
    };
    Ok(Json(ApiResponse::success(status)))
}
