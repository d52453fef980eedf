use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{
    CopyArguments, ModelParameters, NewTask, PlanParameters, ScenarioRegistry, TaskArguments,
    TaskKind,
};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::context::WorkerContext;
use crate::lifecycle::ScenarioLifecycle;
use crate::scheduler::{WorkerRunSummary, WorkerScheduler};

/// 提交任务后确保场景有 Worker 在运行
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn ensure_worker(&self, scenario: &str) -> SchedulerResult<()>;
}

/// 在当前进程中启动非持续模式的调度器
pub struct InProcessWorkerLauncher {
    ctx: WorkerContext,
    shutdown: broadcast::Sender<()>,
    running: Arc<Mutex<HashSet<String>>>,
}

impl InProcessWorkerLauncher {
    pub fn new(ctx: WorkerContext, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            ctx,
            shutdown,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessWorkerLauncher {
    async fn ensure_worker(&self, scenario: &str) -> SchedulerResult<()> {
        if !self.running.lock().await.insert(scenario.to_string()) {
            debug!("场景 {} 的 Worker 已在本进程中运行", scenario);
            return Ok(());
        }

        let scheduler = WorkerScheduler::new(self.ctx.clone(), scenario);
        let registry = self.ctx.registry.clone();
        let shutdown = self.shutdown.clone();
        let mut stop = self.shutdown.subscribe();
        let running = self.running.clone();
        let scenario = scenario.to_string();
        tokio::spawn(async move {
            loop {
                let drained = match scheduler.start(false, shutdown.subscribe()).await {
                    Ok(WorkerRunSummary::AlreadyActive { holder }) => {
                        debug!("场景 {} 由 {} 处理", scenario, holder);
                        false
                    }
                    Ok(WorkerRunSummary::Completed { dispatched }) => {
                        debug!("场景 {} 的 Worker 执行了 {} 个任务", scenario, dispatched);
                        true
                    }
                    Err(e) => {
                        error!("场景 {} 的 Worker 失败: {}", scenario, e);
                        false
                    }
                };
                let stopping = matches!(stop.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_)));
                if drained
                    && !stopping
                    && has_pending_after_run(&running, registry.as_ref(), &scenario).await
                {
                    debug!("场景 {} 在 Worker 退出前又提交了任务，继续运行", scenario);
                    continue;
                }
                running.lock().await.remove(&scenario);
                break;
            }
        });
        Ok(())
    }
}

/// 调度器退出后在持有运行集合锁的情况下检查队列
///
/// 没有等待中的任务时把场景移出运行集合；提交方在锁释放后看到的状态与队列一致。
async fn has_pending_after_run(
    running: &Mutex<HashSet<String>>,
    registry: &dyn ScenarioRegistry,
    scenario: &str,
) -> bool {
    let mut running = running.lock().await;
    let pending = match next_waiting(registry, scenario).await {
        Ok(pending) => pending,
        Err(e) => {
            warn!("无法读取场景 {} 的任务队列: {}", scenario, e);
            false
        }
    };
    if !pending {
        running.remove(scenario);
    }
    pending
}

async fn next_waiting(registry: &dyn ScenarioRegistry, scenario: &str) -> SchedulerResult<bool> {
    Ok(registry.tasks(scenario).await?.next_waiting().await?.is_some())
}

/// 任务提交
pub struct TaskSubmitter {
    registry: Arc<dyn ScenarioRegistry>,
    launcher: Option<Arc<dyn WorkerLauncher>>,
}

impl TaskSubmitter {
    pub fn new(registry: Arc<dyn ScenarioRegistry>) -> Self {
        Self {
            registry,
            launcher: None,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// 校验并写入一个 Waiting 任务，返回任务 id
    ///
    /// 未知场景、未知任务或参数不合法时在写入之前拒绝。
    pub async fn submit(
        &self,
        scenario: &str,
        task_name: &str,
        arguments: Option<&str>,
        user: Option<&str>,
    ) -> SchedulerResult<i64> {
        self.registry.require_descriptor(scenario)?;
        let kind: TaskKind = task_name.parse()?;
        // 复制任务只在默认场景的账本中执行，目标场景不可能是正在执行它的场景
        if kind == TaskKind::CopyScenario && !self.registry.is_default(scenario) {
            return Err(SchedulerError::configuration(format!(
                "复制任务只能提交到默认场景，不能提交到 '{scenario}'"
            )));
        }
        self.validate_arguments(kind, arguments.unwrap_or_default())?;

        let row = self
            .registry
            .scenarios()
            .await?
            .find(scenario)
            .await?
            .ok_or_else(|| SchedulerError::scenario_not_found(scenario))?;
        if !row.is_in_use() {
            return Err(SchedulerError::precondition(format!(
                "场景 '{}' 未在使用中 ({})",
                scenario, row.status
            )));
        }

        let task = NewTask::waiting(
            kind.as_str(),
            arguments.map(str::to_string),
            user.map(str::to_string),
        );
        let id = self.registry.tasks(scenario).await?.insert(&task).await?;
        info!(task_id = id, "场景 {} 已提交任务 '{}'", scenario, kind);

        if let Some(launcher) = &self.launcher {
            if let Err(e) = launcher.ensure_worker(scenario).await {
                warn!("无法为场景 {} 启动 Worker: {}", scenario, e);
            }
        }
        Ok(id)
    }

    fn validate_arguments(&self, kind: TaskKind, raw: &str) -> SchedulerResult<()> {
        match kind {
            TaskKind::GeneratePlan => PlanParameters::parse(raw).map(|_| ()),
            TaskKind::GenerateModel => ModelParameters::parse(raw).map(|_| ()),
            TaskKind::CopyScenario => {
                let args = CopyArguments::parse(raw)?;
                ScenarioLifecycle::validate_copy(self.registry.as_ref(), &args).map(|_| ())
            }
            TaskKind::EmptyDatabase
            | TaskKind::LoadDataset
            | TaskKind::BackupDatabase
            | TaskKind::RestoreDatabase => TaskArguments::parse(raw).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_domain::TaskRepository;
    use scenario_testing_utils::MockScenarioRegistry;

    #[tokio::test]
    async fn test_task_submitted_during_exit_keeps_worker_registered() -> anyhow::Result<()> {
        let registry = MockScenarioRegistry::postgres(&["default"]);
        let running = Mutex::new(HashSet::from(["default".to_string()]));

        // 调度器读到空队列之后、注销之前提交的任务
        let id = registry
            .stores("default")
            .tasks
            .insert(&NewTask::waiting("empty database", None, None))
            .await?;
        assert!(has_pending_after_run(&running, &registry, "default").await);
        assert!(running.lock().await.contains("default"));

        registry
            .stores("default")
            .tasks
            .finish(id, &scenario_domain::TaskStatus::Done, None, chrono::Utc::now())
            .await?;
        assert!(!has_pending_after_run(&running, &registry, "default").await);
        assert!(running.lock().await.is_empty());
        Ok(())
    }
}
