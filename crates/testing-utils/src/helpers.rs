//! Test helper utilities and common testing patterns

use std::time::Duration;

use scenario_core::SchedulerResult;
use scenario_domain::{User, UserRepository};
use scenario_infrastructure::hash_password_with_cost;
use tokio::time::sleep;

/// bcrypt 允许的最低成本，测试中使用以保持速度
pub const TEST_BCRYPT_COST: u32 = 4;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }
}

/// 在给定用户仓储中创建一个活跃用户
pub async fn seed_user(
    repo: &dyn UserRepository,
    username: &str,
    password: &str,
    is_superuser: bool,
) -> SchedulerResult<User> {
    let user = User {
        username: username.to_string(),
        email: None,
        password_hash: hash_password_with_cost(password, TEST_BCRYPT_COST)?,
        is_superuser,
        is_active: true,
    };
    repo.create(&user).await?;
    Ok(user)
}
