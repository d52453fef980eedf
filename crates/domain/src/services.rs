//! 场景管理领域服务
//!
//! 配置同步、释放场景、修改描述。状态迁移全部走 `transition_status`，
//! 因此并发的复制任务与管理操作不会互相覆盖。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use scenario_core::{ScenarioDescriptor, SchedulerError, SchedulerResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::{Scenario, ScenarioStatus};
use crate::registry::ScenarioRegistry;

pub const DEFAULT_SCENARIO_DESCRIPTION: &str = "Production database";

/// 一次同步的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub repaired: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.repaired.is_empty()
    }
}

/// 对比持久化行与配置，计算需要执行的变更（不访问数据库）
pub fn plan_sync(
    existing: &[Scenario],
    descriptors: &[ScenarioDescriptor],
    default_scenario: &str,
) -> (Vec<Scenario>, Vec<String>, Vec<String>) {
    let configured: HashSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    let persisted: HashSet<&str> = existing.iter().map(|s| s.name.as_str()).collect();

    let to_add = descriptors
        .iter()
        .filter(|d| !persisted.contains(d.name.as_str()))
        .map(|d| {
            if d.name == default_scenario {
                Scenario::new(&d.name, ScenarioStatus::InUse)
                    .with_description(DEFAULT_SCENARIO_DESCRIPTION)
            } else {
                Scenario::new(&d.name, ScenarioStatus::Free)
            }
        })
        .collect();

    let to_remove = existing
        .iter()
        .filter(|s| !configured.contains(s.name.as_str()))
        .map(|s| s.name.clone())
        .collect();

    let to_repair = existing
        .iter()
        .filter(|s| s.name == default_scenario && s.status != ScenarioStatus::InUse)
        .map(|s| s.name.clone())
        .collect();

    (to_add, to_remove, to_repair)
}

pub struct ScenarioService {
    registry: Arc<dyn ScenarioRegistry>,
}

impl ScenarioService {
    pub fn new(registry: Arc<dyn ScenarioRegistry>) -> Self {
        Self { registry }
    }

    pub async fn list(&self) -> SchedulerResult<Vec<Scenario>> {
        self.registry.scenarios().await?.list().await
    }

    /// 使持久化的场景行与配置一致
    pub async fn sync(&self) -> SchedulerResult<SyncReport> {
        let repo = self.registry.scenarios().await?;
        let existing = repo.list().await?;
        let default = self.registry.default_scenario();
        let (to_add, to_remove, to_repair) =
            plan_sync(&existing, self.registry.descriptors(), default);

        let mut report = SyncReport::default();
        for scenario in &to_add {
            repo.insert(scenario).await?;
            report.added.push(scenario.name.clone());
        }
        for name in to_remove {
            if repo.delete(&name).await? {
                report.removed.push(name);
            }
        }
        for name in to_repair {
            warn!("默认场景 {} 状态异常，修复为 in use", name);
            repo.transition_status(
                &name,
                &[ScenarioStatus::Free, ScenarioStatus::Busy],
                ScenarioStatus::InUse,
            )
            .await?;
            report.repaired.push(name);
        }

        if !report.is_noop() {
            info!(
                "场景同步完成: 新增 {:?}, 删除 {:?}, 修复 {:?}",
                report.added, report.removed, report.repaired
            );
        }
        Ok(report)
    }

    /// 释放非默认场景：状态置为 Free
    pub async fn release(&self, name: &str) -> SchedulerResult<Scenario> {
        self.registry.require_descriptor(name)?;
        if self.registry.is_default(name) {
            return Err(SchedulerError::precondition("默认场景不能被释放"));
        }

        let repo = self.registry.scenarios().await?;
        let mut scenario = repo
            .find(name)
            .await?
            .ok_or_else(|| SchedulerError::scenario_not_found(name))?;
        if scenario.status == ScenarioStatus::Free {
            return Err(SchedulerError::precondition(format!(
                "场景 {name} 已处于空闲状态"
            )));
        }

        if !repo
            .transition_status(
                name,
                &[ScenarioStatus::InUse, ScenarioStatus::Busy],
                ScenarioStatus::Free,
            )
            .await?
        {
            return Err(SchedulerError::precondition(format!(
                "场景 {name} 状态已被并发修改"
            )));
        }

        scenario.status = ScenarioStatus::Free;
        scenario.last_refresh = Some(Utc::now());
        repo.update(&scenario).await?;
        info!("场景 {} 已释放", name);
        Ok(scenario)
    }

    pub async fn update_description(
        &self,
        name: &str,
        description: Option<String>,
    ) -> SchedulerResult<Scenario> {
        self.registry.require_descriptor(name)?;
        let repo = self.registry.scenarios().await?;
        let mut scenario = repo
            .find(name)
            .await?
            .ok_or_else(|| SchedulerError::scenario_not_found(name))?;
        scenario.description = description.filter(|d| !d.trim().is_empty());
        repo.update(&scenario).await?;
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors() -> Vec<ScenarioDescriptor> {
        vec![
            ScenarioDescriptor::new("default", "sqlite://default.db"),
            ScenarioDescriptor::new("s1", "sqlite://s1.db"),
            ScenarioDescriptor::new("s2", "sqlite://s2.db"),
        ]
    }

    #[test]
    fn test_plan_sync_on_empty_table() {
        let (add, remove, repair) = plan_sync(&[], &descriptors(), "default");
        assert_eq!(add.len(), 3);
        assert_eq!(add[0].status, ScenarioStatus::InUse);
        assert_eq!(add[0].description.as_deref(), Some(DEFAULT_SCENARIO_DESCRIPTION));
        assert!(add[1..].iter().all(|s| s.status == ScenarioStatus::Free));
        assert!(remove.is_empty());
        assert!(repair.is_empty());
    }

    #[test]
    fn test_plan_sync_keeps_configured_rows() {
        let existing = vec![
            Scenario::new("default", ScenarioStatus::Free),
            Scenario::new("s1", ScenarioStatus::InUse),
            Scenario::new("obsolete", ScenarioStatus::Free),
        ];
        let (add, remove, repair) = plan_sync(&existing, &descriptors(), "default");
        assert_eq!(add.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["s2"]);
        assert_eq!(remove, vec!["obsolete".to_string()]);
        assert_eq!(repair, vec!["default".to_string()]);
    }
}
