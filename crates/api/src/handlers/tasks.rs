use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use scenario_core::SchedulerError;
use scenario_domain::{Task, TaskKind};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{RequestPrincipal, PERM_ADD_TASK, PERM_VIEW_TASK},
    error::{ApiError, ApiResult},
    response::ApiResponse,
    routes::AppState,
    routing::ScenarioContext,
};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 500;

/// 任务提交请求
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub name: String,
    pub arguments: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: i64,
    pub scenario: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub limit: Option<u32>,
}

/// 提交某类任务所需的权限；未知任务由提交时的校验拒绝
fn permission_for(task_name: &str) -> &'static str {
    task_name
        .parse::<TaskKind>()
        .map(|kind| kind.required_permission())
        .unwrap_or(PERM_ADD_TASK)
}

/// 向当前路由的场景提交任务
pub async fn submit_task(
    State(state): State<AppState>,
    context: ScenarioContext,
    principal: RequestPrincipal,
    Json(request): Json<SubmitTaskRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<SubmitTaskResponse>>)> {
    principal
        .require_permission(permission_for(&request.name))
        .await?;

    let task_id = state
        .submitter
        .submit(
            context.name(),
            &request.name,
            request.arguments.as_deref(),
            Some(principal.username()),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SubmitTaskResponse {
            task_id,
            scenario: context.name().to_string(),
        })),
    ))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    context: ScenarioContext,
    principal: RequestPrincipal,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<Json<ApiResponse<Vec<Task>>>> {
    principal.require_permission(PERM_VIEW_TASK).await?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "limit 必须在 1 到 {MAX_PAGE_SIZE} 之间"
        )));
    }

    let tasks = state
        .registry
        .tasks(context.name())
        .await?
        .list_recent(limit)
        .await?;
    Ok(Json(ApiResponse::success(tasks)))
}

pub async fn get_task(
    State(state): State<AppState>,
    context: ScenarioContext,
    principal: RequestPrincipal,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse<Task>>> {
    principal.require_permission(PERM_VIEW_TASK).await?;
    let task = state
        .registry
        .tasks(context.name())
        .await?
        .find_by_id(id)
        .await?
        .ok_or(SchedulerError::TaskNotFound { id })?;
    Ok(Json(ApiResponse::success(task)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{PERM_COPY_SCENARIO, PERM_GENERATE_PLAN};

    #[test]
    fn test_permission_per_task_kind() {
        assert_eq!(permission_for("generate plan"), PERM_GENERATE_PLAN);
        assert_eq!(permission_for("copy scenario"), PERM_COPY_SCENARIO);
        assert_eq!(permission_for("backup database"), PERM_ADD_TASK);
        assert_eq!(permission_for("generate model"), PERM_ADD_TASK);
        assert_eq!(permission_for("no such task"), PERM_ADD_TASK);
    }
}
