use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::ApiResult, response::ApiResponse, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub username: String,
    /// 场景名 → 是否超级用户
    pub scenarios: BTreeMap<String, bool>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<LoginResponse>>> {
    info!("User login attempt: {}", request.username);
    let session = state.auth.login(&request.username, &request.password).await?;

    let scenarios = session
        .capabilities
        .scenarios()
        .filter_map(|name| {
            session
                .capabilities
                .is_superuser_in(name)
                .map(|su| (name.to_string(), su))
        })
        .collect();

    Ok(Json(ApiResponse::success(LoginResponse {
        access_token: session.token,
        token_type: "Bearer".to_string(),
        expires_in: state.auth.sessions().ttl().num_seconds(),
        username: session.username,
        scenarios,
    })))
}
