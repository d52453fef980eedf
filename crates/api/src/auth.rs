pub mod capabilities;
pub mod principal;
pub mod service;
pub mod session;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose, Engine as _};

use crate::error::{ApiError, ApiResult};

pub use capabilities::CapabilityResolver;
pub use principal::RequestPrincipal;
pub use service::AuthService;
pub use session::{Session, SessionStore};

pub const BEARER_PREFIX: &str = "Bearer ";
pub const BASIC_PREFIX: &str = "Basic ";

pub use scenario_domain::{PERM_ADD_TASK, PERM_COPY_SCENARIO, PERM_GENERATE_PLAN};

pub const PERM_VIEW_TASK: &str = "execute.view_task";
pub const PERM_RELEASE_SCENARIO: &str = "execute.release_scenario";
pub const PERM_CHANGE_SCENARIO: &str = "common.change_scenario";

/// 请求携带的认证信息
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
}

impl Credentials {
    /// 解析 `Authorization` 头；没有该头时返回 `None`
    pub fn from_headers(headers: &HeaderMap) -> ApiResult<Option<Self>> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(None);
        };
        let value = value
            .to_str()
            .map_err(|_| ApiError::Unauthorized("认证头格式错误".to_string()))?;

        if let Some(token) = value.strip_prefix(BEARER_PREFIX) {
            return Ok(Some(Credentials::Bearer(token.trim().to_string())));
        }

        if let Some(encoded) = value.strip_prefix(BASIC_PREFIX) {
            let decoded = general_purpose::STANDARD
                .decode(encoded.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| ApiError::Unauthorized("Basic 认证信息无法解码".to_string()))?;
            let (username, password) = decoded
                .split_once(':')
                .ok_or_else(|| ApiError::Unauthorized("Basic 认证信息缺少密码".to_string()))?;
            return Ok(Some(Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }));
        }

        Err(ApiError::Unauthorized("不支持的认证方式".to_string()))
    }
}
