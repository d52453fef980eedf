use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{
    CopyArguments, NewTask, ScenarioRegistry, Task, TaskArguments, TaskRepository, TaskStatus,
};
use tracing::{debug, error, info, warn};

use super::{ProgressReporter, TaskHandler, TaskOutcome};
use crate::lifecycle::ScenarioLifecycle;

/// "copy scenario"
pub struct CopyScenarioHandler {
    lifecycle: Arc<ScenarioLifecycle>,
}

impl CopyScenarioHandler {
    pub fn new(lifecycle: Arc<ScenarioLifecycle>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl TaskHandler for CopyScenarioHandler {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        _progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome> {
        let args = CopyArguments::parse(task.arguments_str())?;
        // 覆盖目标数据库会同时替换正在使用的任务账本
        if args.destination == scenario {
            return Err(SchedulerError::configuration(format!(
                "不能复制到正在执行该任务的场景 '{scenario}'"
            )));
        }
        let copied = self.lifecycle.copy(&args).await?;
        Ok(TaskOutcome::done(format!(
            "Copied scenario '{}' to '{}'",
            args.source, copied.name
        )))
    }
}

/// "backup database"
pub struct BackupDatabaseHandler {
    lifecycle: Arc<ScenarioLifecycle>,
}

impl BackupDatabaseHandler {
    pub fn new(lifecycle: Arc<ScenarioLifecycle>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl TaskHandler for BackupDatabaseHandler {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome> {
        let args = TaskArguments::parse(task.arguments_str())?;
        args.ensure_known_options(&[])?;

        let artifact = self.lifecycle.backup(scenario).await?;
        progress.report(99).await?;

        match self.lifecycle.prune_backups().await {
            Ok(0) => {}
            Ok(removed) => info!("已清理 {} 个过期备份", removed),
            Err(e) => warn!("清理过期备份失败: {}", e),
        }

        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(TaskOutcome::done(format!("Backup to file {file_name}")))
    }
}

/// "restore database"
///
/// 恢复会覆盖整个场景数据库（包括任务表），因此原任务记录不再可靠。
/// 外部命令开始执行后，结果写入一条新的任务记录；原记录若仍在则同时结束。
pub struct RestoreDatabaseHandler {
    registry: Arc<dyn ScenarioRegistry>,
    lifecycle: Arc<ScenarioLifecycle>,
}

impl RestoreDatabaseHandler {
    pub fn new(registry: Arc<dyn ScenarioRegistry>, lifecycle: Arc<ScenarioLifecycle>) -> Self {
        Self {
            registry,
            lifecycle,
        }
    }
}

#[async_trait]
impl TaskHandler for RestoreDatabaseHandler {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        _progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome> {
        let args = TaskArguments::parse(task.arguments_str())?;
        args.ensure_known_options(&[])?;
        let artifact = match args.positional() {
            [] => return Err(SchedulerError::invalid_params("No dump file specified")),
            [artifact] => artifact,
            more => {
                return Err(SchedulerError::invalid_params(format!(
                    "只能指定一个备份文件，实际得到 {} 个",
                    more.len()
                )))
            }
        };
        self.lifecycle.ensure_restorable(scenario)?;
        let path = self.lifecycle.resolve_artifact(artifact).await?;

        let (status, message) = match self.lifecycle.restore(scenario, &path).await {
            Ok(()) => (TaskStatus::Done, Some(format!("Restored from {artifact}"))),
            Err(e) => {
                error!("场景 {} 恢复失败: {}", scenario, e);
                (TaskStatus::Failed, Some(e.to_string()))
            }
        };

        let finished = Utc::now();
        let tasks = self.registry.tasks(scenario).await?;
        let record = NewTask::terminal_copy_of(task, status.clone(), message.clone(), finished);
        let id = tasks.insert(&record).await?;
        info!("恢复结果已记录为任务 {}", id);

        finish_original(tasks.as_ref(), task, &status, message.as_deref(), finished).await;
        Ok(TaskOutcome::Detached)
    }
}

/// 恢复后原任务 id 若仍指向同一条未结束的记录，则写入相同的终态
///
/// 备份中可能不存在该记录，也可能是另一条任务占用了同一 id，这两种情况都跳过。
async fn finish_original(
    tasks: &dyn TaskRepository,
    task: &Task,
    status: &TaskStatus,
    message: Option<&str>,
    finished: DateTime<Utc>,
) {
    let current = match tasks.find_by_id(task.id).await {
        Ok(current) => current,
        Err(e) => {
            warn!(task_id = task.id, "恢复后无法读取原任务: {}", e);
            return;
        }
    };
    let same_task = current.is_some_and(|current| {
        current.name == task.name && current.submitted == task.submitted && !current.is_terminal()
    });
    if !same_task {
        debug!(task_id = task.id, "恢复后的数据库中没有原任务记录");
        return;
    }
    match tasks.finish(task.id, status, message, finished).await {
        Ok(()) => {}
        Err(e) if e.is_rejection() || matches!(e, SchedulerError::TaskNotFound { .. }) => {
            debug!(task_id = task.id, "原任务已结束: {}", e)
        }
        Err(e) => warn!(task_id = task.id, "无法结束原任务: {}", e),
    }
}
