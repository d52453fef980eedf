use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::{ScenarioDescriptor, SchedulerError, SchedulerResult};

use crate::repositories::{
    LivenessRepository, MaintenanceRepository, ScenarioRepository, TaskRepository, UserRepository,
};

/// 场景注册表
///
/// 显式构造并注入的对象：持有配置中的场景描述符，并按场景提供仓储句柄。
/// 场景元数据始终存放在默认场景的数据库中。
#[async_trait]
pub trait ScenarioRegistry: Send + Sync {
    fn default_scenario(&self) -> &str;

    /// 配置顺序的场景描述符（包含默认场景）
    fn descriptors(&self) -> &[ScenarioDescriptor];

    fn descriptor(&self, name: &str) -> Option<&ScenarioDescriptor> {
        self.descriptors().iter().find(|d| d.name == name)
    }

    fn require_descriptor(&self, name: &str) -> SchedulerResult<&ScenarioDescriptor> {
        self.descriptor(name)
            .ok_or_else(|| SchedulerError::configuration(format!("未配置的场景: '{name}'")))
    }

    fn is_default(&self, name: &str) -> bool {
        self.default_scenario() == name
    }

    async fn scenarios(&self) -> SchedulerResult<Arc<dyn ScenarioRepository>>;
    async fn tasks(&self, scenario: &str) -> SchedulerResult<Arc<dyn TaskRepository>>;
    async fn liveness(&self, scenario: &str) -> SchedulerResult<Arc<dyn LivenessRepository>>;
    async fn users(&self, scenario: &str) -> SchedulerResult<Arc<dyn UserRepository>>;
    async fn maintenance(&self, scenario: &str)
        -> SchedulerResult<Arc<dyn MaintenanceRepository>>;

    /// 关闭场景的连接池；在文件级复制或恢复覆盖数据库之前调用
    async fn disconnect(&self, scenario: &str);
}
