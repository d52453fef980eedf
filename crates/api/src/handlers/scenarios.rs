use axum::{
    extract::{Path, State},
    Json,
};
use scenario_domain::{Scenario, SyncReport};
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::{RequestPrincipal, PERM_CHANGE_SCENARIO, PERM_RELEASE_SCENARIO},
    error::ApiResult,
    response::ApiResponse,
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct DescriptionRequest {
    pub description: Option<String>,
}

pub async fn list_scenarios(
    State(state): State<AppState>,
    _principal: RequestPrincipal,
) -> ApiResult<Json<ApiResponse<Vec<Scenario>>>> {
    let scenarios = state.scenarios.list().await?;
    Ok(Json(ApiResponse::success(scenarios)))
}

/// 按配置重新同步场景表，仅限超级用户
pub async fn sync_scenarios(
    State(state): State<AppState>,
    principal: RequestPrincipal,
) -> ApiResult<Json<ApiResponse<SyncReport>>> {
    principal.require_superuser()?;
    let report = state.scenarios.sync().await?;
    info!(
        added = report.added.len(),
        removed = report.removed.len(),
        "用户 {} 同步了场景配置",
        principal.username()
    );
    Ok(Json(ApiResponse::success(report)))
}

pub async fn release_scenario(
    State(state): State<AppState>,
    principal: RequestPrincipal,
    Path(name): Path<String>,
) -> ApiResult<Json<ApiResponse<Scenario>>> {
    principal.require_permission(PERM_RELEASE_SCENARIO).await?;
    let scenario = state.scenarios.release(&name).await?;
    Ok(Json(ApiResponse::success_with_message(
        scenario,
        format!("场景 '{name}' 已释放"),
    )))
}

pub async fn update_description(
    State(state): State<AppState>,
    principal: RequestPrincipal,
    Path(name): Path<String>,
    Json(request): Json<DescriptionRequest>,
) -> ApiResult<Json<ApiResponse<Scenario>>> {
    principal.require_permission(PERM_CHANGE_SCENARIO).await?;
    let scenario = state
        .scenarios
        .update_description(&name, request.description)
        .await?;
    Ok(Json(ApiResponse::success(scenario)))
}
