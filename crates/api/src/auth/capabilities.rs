use std::sync::Arc;

use futures::future::join_all;
use scenario_core::SchedulerResult;
use scenario_domain::{CapabilityMap, ScenarioRegistry, User};
use tracing::{debug, warn};

/// 计算用户在各场景中的能力映射
///
/// 并发查询每个 InUse 场景（包括默认场景）的用户表。用户存在且处于
/// 活跃状态时记录 `场景 -> 是否超级用户`；不存在或查询失败的场景不出现
/// 在映射中。
pub struct CapabilityResolver {
    registry: Arc<dyn ScenarioRegistry>,
}

impl CapabilityResolver {
    pub fn new(registry: Arc<dyn ScenarioRegistry>) -> Self {
        Self { registry }
    }

    pub async fn resolve(&self, username: &str) -> SchedulerResult<CapabilityMap> {
        let in_use: Vec<String> = self
            .registry
            .scenarios()
            .await?
            .list()
            .await?
            .into_iter()
            .filter(|s| s.is_in_use() && self.registry.descriptor(&s.name).is_some())
            .map(|s| s.name)
            .collect();

        let lookups = in_use.iter().map(|scenario| async move {
            (scenario, self.lookup(scenario, username).await)
        });

        let mut capabilities = CapabilityMap::new();
        for (scenario, result) in join_all(lookups).await {
            match result {
                Ok(Some(user)) if user.is_active => {
                    capabilities.insert(scenario.as_str(), user.is_superuser)
                }
                Ok(Some(_)) => debug!("用户 {} 在场景 {} 中已停用", username, scenario),
                Ok(None) => {}
                Err(e) => warn!("查询场景 {} 的用户 {} 失败: {}", scenario, username, e),
            }
        }
        Ok(capabilities)
    }

    async fn lookup(&self, scenario: &str, username: &str) -> SchedulerResult<Option<User>> {
        self.registry
            .users(scenario)
            .await?
            .find_by_username(username)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_domain::ScenarioStatus;
    use scenario_testing_utils::{seed_user, MockScenarioRegistry};

    #[tokio::test]
    async fn test_map_covers_in_use_scenarios_only() {
        let registry = Arc::new(MockScenarioRegistry::postgres(&[
            "default", "s3", "s4", "s5",
        ]));
        registry.set_status("s3", ScenarioStatus::InUse);
        registry.set_status("s5", ScenarioStatus::InUse);
        seed_user(&registry.stores("default").users, "alice", "pw", false)
            .await
            .unwrap();
        seed_user(&registry.stores("s3").users, "alice", "pw", true)
            .await
            .unwrap();
        seed_user(&registry.stores("s4").users, "alice", "pw", true)
            .await
            .unwrap();

        let map = CapabilityResolver::new(registry.clone())
            .resolve("alice")
            .await
            .unwrap();
        assert_eq!(map.is_superuser_in("default"), Some(false));
        assert_eq!(map.is_superuser_in("s3"), Some(true));
        assert!(!map.has_access("s4"));
        assert!(!map.has_access("s5"));
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_excludes_scenario() {
        let registry = Arc::new(MockScenarioRegistry::postgres(&["default", "s1"]));
        registry.set_status("s1", ScenarioStatus::InUse);
        for scenario in ["default", "s1"] {
            seed_user(&registry.stores(scenario).users, "bob", "pw", false)
                .await
                .unwrap();
        }
        registry.fail_user_lookups("s1");

        let map = CapabilityResolver::new(registry.clone())
            .resolve("bob")
            .await
            .unwrap();
        assert!(map.has_access("default"));
        assert!(!map.has_access("s1"));
    }
}
