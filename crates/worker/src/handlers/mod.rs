//! 任务处理器
//!
//! 每种 `TaskKind` 对应一个处理器，`TaskHandlers::for_kind` 中的 `match`
//! 是任务名称到处理逻辑的唯一映射。

use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::SchedulerResult;
use scenario_domain::{Task, TaskKind, TaskRepository, TaskStatus};

use crate::context::WorkerContext;
use crate::lifecycle::ScenarioLifecycle;

mod lifecycle;
mod maintenance;
mod model;
mod plan;

pub use lifecycle::{BackupDatabaseHandler, CopyScenarioHandler, RestoreDatabaseHandler};
pub use maintenance::{EmptyDatabaseHandler, LoadDatasetHandler};
pub use model::GenerateModelHandler;
pub use plan::{plan_status, GeneratePlanHandler};

/// 处理器的执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// 由调度器写入终态
    Finished {
        status: TaskStatus,
        message: Option<String>,
    },
    /// 处理器自行负责任务记录，调度器不再更新
    Detached,
}

impl TaskOutcome {
    pub fn done(message: impl Into<String>) -> Self {
        TaskOutcome::Finished {
            status: TaskStatus::Done,
            message: Some(message.into()),
        }
    }
}

/// 向任务账本报告进度
#[derive(Clone)]
pub struct ProgressReporter {
    tasks: Arc<dyn TaskRepository>,
    task_id: i64,
}

impl ProgressReporter {
    pub fn new(tasks: Arc<dyn TaskRepository>, task_id: i64) -> Self {
        Self { tasks, task_id }
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    pub async fn report(&self, percent: u8) -> SchedulerResult<()> {
        self.tasks
            .update_progress(self.task_id, &TaskStatus::progress(percent))
            .await
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome>;
}

pub struct TaskHandlers {
    generate_plan: GeneratePlanHandler,
    generate_model: GenerateModelHandler,
    empty_database: EmptyDatabaseHandler,
    load_dataset: LoadDatasetHandler,
    copy_scenario: CopyScenarioHandler,
    backup_database: BackupDatabaseHandler,
    restore_database: RestoreDatabaseHandler,
}

impl TaskHandlers {
    pub fn new(ctx: &WorkerContext) -> Self {
        let lifecycle = Arc::new(ScenarioLifecycle::new(
            ctx.registry.clone(),
            ctx.commands.clone(),
            ctx.lifecycle.clone(),
        )
        .with_liveness_threshold(ctx.worker.liveness_threshold()));
        Self {
            generate_plan: GeneratePlanHandler::new(ctx.registry.clone(), ctx.engine.clone()),
            generate_model: GenerateModelHandler::new(
                ctx.registry.clone(),
                ctx.commands.clone(),
                ctx.engine_config.clone(),
                ctx.maintenance.flush_tables.clone(),
            ),
            empty_database: EmptyDatabaseHandler::new(
                ctx.registry.clone(),
                ctx.maintenance.flush_tables.clone(),
            ),
            load_dataset: LoadDatasetHandler::new(
                ctx.registry.clone(),
                &ctx.maintenance.fixtures_dir,
            ),
            copy_scenario: CopyScenarioHandler::new(lifecycle.clone()),
            backup_database: BackupDatabaseHandler::new(lifecycle.clone()),
            restore_database: RestoreDatabaseHandler::new(ctx.registry.clone(), lifecycle),
        }
    }

    pub fn for_kind(&self, kind: TaskKind) -> &dyn TaskHandler {
        match kind {
            TaskKind::GeneratePlan => &self.generate_plan,
            TaskKind::GenerateModel => &self.generate_model,
            TaskKind::EmptyDatabase => &self.empty_database,
            TaskKind::LoadDataset => &self.load_dataset,
            TaskKind::CopyScenario => &self.copy_scenario,
            TaskKind::BackupDatabase => &self.backup_database,
            TaskKind::RestoreDatabase => &self.restore_database,
        }
    }
}
