//! 领域仓储抽象
//!
//! 每个场景是一个独立的数据库，因此除 `ScenarioRepository`（位于默认场景）外，
//! 所有仓储实例都绑定到单个场景。

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scenario_core::SchedulerResult;

use crate::entities::{NewTask, Scenario, ScenarioStatus, Task, TaskStatus, User, WorkerLiveness};

/// 场景元数据仓储（默认场景数据库中的 `scenarios` 表）
#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    async fn list(&self) -> SchedulerResult<Vec<Scenario>>;
    async fn find(&self, name: &str) -> SchedulerResult<Option<Scenario>>;
    async fn insert(&self, scenario: &Scenario) -> SchedulerResult<()>;
    async fn update(&self, scenario: &Scenario) -> SchedulerResult<()>;
    async fn delete(&self, name: &str) -> SchedulerResult<bool>;

    /// 条件状态迁移：仅当当前状态属于 `from` 时写入 `to`，返回是否发生了迁移
    async fn transition_status(
        &self,
        name: &str,
        from: &[ScenarioStatus],
        to: ScenarioStatus,
    ) -> SchedulerResult<bool>;
}

/// 任务账本
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &NewTask) -> SchedulerResult<i64>;
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>>;

    /// id 最小的 Waiting 任务
    async fn next_waiting(&self) -> SchedulerResult<Option<Task>>;

    /// 设置 `started`（若未设置）与进行中状态
    async fn mark_started(
        &self,
        id: i64,
        at: DateTime<Utc>,
        status: &TaskStatus,
        message: Option<&str>,
    ) -> SchedulerResult<()>;

    /// 更新进度，已结束的任务不受影响
    async fn update_progress(&self, id: i64, status: &TaskStatus) -> SchedulerResult<()>;

    /// 写入终态；任务已结束时返回前置条件错误
    async fn finish(
        &self,
        id: i64,
        status: &TaskStatus,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    async fn list_recent(&self, limit: u32) -> SchedulerResult<Vec<Task>>;

    /// 已开始但尚未结束的任务，按 id 升序
    async fn list_unfinished(&self) -> SchedulerResult<Vec<Task>>;
}

/// Worker 存活记录（`system_state` 表中的 `worker_alive` 键）
#[async_trait]
pub trait LivenessRepository: Send + Sync {
    async fn read(&self) -> SchedulerResult<Option<WorkerLiveness>>;
    async fn beat(&self, holder: &str, at: DateTime<Utc>) -> SchedulerResult<()>;
    async fn clear(&self) -> SchedulerResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> SchedulerResult<Option<User>>;

    /// 按邮箱查找，不区分大小写；多个用户共用同一邮箱时视为找不到
    async fn find_by_email(&self, email: &str) -> SchedulerResult<Option<User>>;

    /// 用户权限与其所属组权限的并集
    async fn permissions_of(&self, username: &str) -> SchedulerResult<Vec<String>>;

    async fn create(&self, user: &User) -> SchedulerResult<()>;
    async fn grant_permission(&self, username: &str, permission: &str) -> SchedulerResult<()>;
    async fn add_to_group(&self, username: &str, group: &str) -> SchedulerResult<()>;
    async fn grant_group_permission(&self, group: &str, permission: &str) -> SchedulerResult<()>;
}

/// 场景数据维护（清空业务表、执行数据集脚本）
#[async_trait]
pub trait MaintenanceRepository: Send + Sync {
    /// 按顺序删除给定表的全部行，返回删除的总行数
    async fn flush_tables(&self, tables: &[String]) -> SchedulerResult<u64>;
    async fn execute_script(&self, script: &Path) -> SchedulerResult<()>;
}
