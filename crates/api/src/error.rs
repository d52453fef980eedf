use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scenario_core::SchedulerError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("认证失败: {0}")]
    Unauthorized(String),

    #[error("权限不足: {0}")]
    Forbidden(String),

    #[error("未找到资源: {0}")]
    NotFound(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str, Vec<String>) {
        match self {
            ApiError::Scheduler(SchedulerError::ScenarioNotFound { name }) => (
                StatusCode::NOT_FOUND,
                format!("场景 '{name}' 不存在"),
                "SCENARIO_NOT_FOUND",
                vec!["使用 GET /api/scenarios 查看所有场景".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::TaskNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 ID {id} 不存在"),
                "TASK_NOT_FOUND",
                vec!["使用 GET /api/tasks 查看当前场景的任务".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::Configuration(msg)) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                "CONFIGURATION_ERROR",
                vec!["请检查场景名称与任务名称是否已配置".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::InvalidTaskParams(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("任务参数无效: {msg}"),
                "INVALID_TASK_PARAMS",
                vec!["请检查任务参数格式是否正确".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::Precondition(msg)) => (
                StatusCode::CONFLICT,
                msg.clone(),
                "PRECONDITION_FAILED",
                vec!["请刷新场景状态后重试".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::Authentication(msg)) | ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                msg.clone(),
                "AUTHENTICATION_ERROR",
                vec![
                    "使用 Authorization: Basic 或 Bearer <token> 认证".to_string(),
                    "使用 POST /api/auth/login 获取令牌".to_string(),
                ],
            ),
            ApiError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                msg.clone(),
                "FORBIDDEN",
                vec!["请联系管理员获取相应权限".to_string()],
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                msg.clone(),
                "NOT_FOUND",
                vec!["请检查请求URL是否正确".to_string()],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST",
                vec!["请检查请求格式和参数".to_string()],
            ),
            ApiError::Scheduler(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    "查看 GET /health 检查系统状态".to_string(),
                ],
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type, suggestions) = self.parts();
        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
