use std::sync::Arc;

use chrono::Duration;
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{CapabilityMap, ScenarioRegistry, User};
use scenario_infrastructure::verify_password;
use tracing::{info, warn};

use crate::auth::{CapabilityResolver, Credentials, Session, SessionStore};

/// 已认证的身份及其场景能力映射
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub capabilities: CapabilityMap,
}

/// 主认证：密码只在默认场景的用户表中校验
pub struct AuthService {
    registry: Arc<dyn ScenarioRegistry>,
    resolver: CapabilityResolver,
    sessions: SessionStore,
}

impl AuthService {
    pub fn new(registry: Arc<dyn ScenarioRegistry>, session_ttl: Duration) -> Self {
        Self {
            resolver: CapabilityResolver::new(registry.clone()),
            registry,
            sessions: SessionStore::new(session_ttl),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn verify(&self, username: &str, password: &str) -> SchedulerResult<User> {
        let users = self.registry.users(self.registry.default_scenario()).await?;
        let rejected = || SchedulerError::Authentication("用户名或密码错误".to_string());

        // 用户名不存在时按邮箱查找
        let user = match users.find_by_username(username).await? {
            Some(user) => user,
            None if username.contains('@') => {
                users.find_by_email(username).await?.ok_or_else(rejected)?
            }
            None => return Err(rejected()),
        };
        if !user.is_active {
            warn!("已停用的用户 {} 尝试登录", username);
            return Err(SchedulerError::Authentication("用户已停用".to_string()));
        }

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| SchedulerError::Internal(format!("密码校验任务失败: {e}")))?;
        if !valid {
            return Err(rejected());
        }
        Ok(user)
    }

    /// 校验密码并创建会话，能力映射在登录时计算一次
    pub async fn login(&self, username: &str, password: &str) -> SchedulerResult<Session> {
        let user = self.verify(username, password).await?;
        let capabilities = self.resolver.resolve(&user.username).await?;
        let session = self.sessions.create(&user.username, capabilities).await;
        info!(
            scenarios = session.capabilities.len(),
            "用户 {} 登录成功", user.username
        );
        Ok(session)
    }

    /// 每个请求的认证：Basic 每次重新计算能力映射，Bearer 使用会话中的映射
    pub async fn authenticate(&self, credentials: Credentials) -> SchedulerResult<Identity> {
        match credentials {
            Credentials::Basic { username, password } => {
                let user = self.verify(&username, &password).await?;
                let capabilities = self.resolver.resolve(&user.username).await?;
                Ok(Identity {
                    username: user.username,
                    capabilities,
                })
            }
            Credentials::Bearer(token) => {
                let session = self.sessions.get(&token).await.ok_or_else(|| {
                    SchedulerError::Authentication("令牌无效或已过期".to_string())
                })?;
                Ok(Identity {
                    username: session.username,
                    capabilities: session.capabilities,
                })
            }
        }
    }
}
