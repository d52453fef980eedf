use std::collections::HashSet;
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use scenario_domain::ScenarioRegistry;
use tokio::sync::OnceCell;

use crate::auth::Credentials;
use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;
use crate::routing::ScenarioContext;

/// 当前请求的已认证用户，绑定到路由选中的场景
///
/// 权限在第一次检查时从该场景加载，只缓存在本对象上，随请求结束而丢弃。
pub struct RequestPrincipal {
    username: String,
    scenario: String,
    is_superuser: bool,
    registry: Arc<dyn ScenarioRegistry>,
    permissions: OnceCell<HashSet<String>>,
}

impl RequestPrincipal {
    pub fn new(
        username: impl Into<String>,
        scenario: impl Into<String>,
        is_superuser: bool,
        registry: Arc<dyn ScenarioRegistry>,
    ) -> Self {
        Self {
            username: username.into(),
            scenario: scenario.into(),
            is_superuser,
            registry,
            permissions: OnceCell::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }

    pub async fn has_permission(&self, permission: &str) -> ApiResult<bool> {
        if self.is_superuser {
            return Ok(true);
        }
        let permissions = self
            .permissions
            .get_or_try_init(|| async {
                let users = self.registry.users(&self.scenario).await?;
                let granted = users.permissions_of(&self.username).await?;
                Ok::<_, ApiError>(granted.into_iter().collect::<HashSet<_>>())
            })
            .await?;
        Ok(permissions.contains(permission))
    }

    pub async fn require_permission(&self, permission: &str) -> ApiResult<()> {
        if self.has_permission(permission).await? {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "用户 {} 在场景 '{}' 中缺少权限 {}",
                self.username, self.scenario, permission
            )))
        }
    }

    pub fn require_superuser(&self) -> ApiResult<()> {
        if self.is_superuser {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "需要场景 '{}' 的超级用户权限",
                self.scenario
            )))
        }
    }
}

impl FromRequestParts<AppState> for RequestPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = ScenarioContext::from_request_parts(parts, state).await?;
        let credentials = Credentials::from_headers(&parts.headers)?
            .ok_or_else(|| ApiError::Unauthorized("缺少认证信息".to_string()))?;
        let identity = state.auth.authenticate(credentials).await?;

        let is_superuser = identity
            .capabilities
            .is_superuser_in(context.name())
            .ok_or_else(|| {
                ApiError::Forbidden(format!(
                    "用户 {} 无权访问场景 '{}'",
                    identity.username,
                    context.name()
                ))
            })?;

        Ok(RequestPrincipal::new(
            identity.username,
            context.name(),
            is_superuser,
            state.registry.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_domain::UserRepository;
    use scenario_testing_utils::{seed_user, MockScenarioRegistry};

    #[tokio::test]
    async fn test_permissions_loaded_once_per_principal() {
        let registry = Arc::new(MockScenarioRegistry::postgres(&["default"]));
        let users = &registry.stores("default").users;
        seed_user(users, "alice", "pw", false).await.unwrap();
        users.add_to_group("alice", "planners").await.unwrap();
        users
            .grant_group_permission("planners", "execute.generate_plan")
            .await
            .unwrap();
        users
            .grant_permission("alice", "execute.view_task")
            .await
            .unwrap();

        let principal = RequestPrincipal::new("alice", "default", false, registry.clone());
        assert!(principal.has_permission("execute.generate_plan").await.unwrap());
        assert!(principal.has_permission("execute.view_task").await.unwrap());
        assert!(!principal.has_permission("execute.copy_scenario").await.unwrap());
        assert_eq!(users.permission_lookups(), 1);

        // 新请求重新加载
        let next = RequestPrincipal::new("alice", "default", false, registry.clone());
        next.require_permission("execute.view_task").await.unwrap();
        assert_eq!(users.permission_lookups(), 2);
    }

    #[tokio::test]
    async fn test_superuser_bypasses_lookup() {
        let registry = Arc::new(MockScenarioRegistry::postgres(&["default"]));
        let principal = RequestPrincipal::new("root", "default", true, registry.clone());
        assert!(principal.has_permission("anything").await.unwrap());
        assert!(principal.require_superuser().is_ok());
        assert_eq!(registry.stores("default").users.permission_lookups(), 0);
    }
}
