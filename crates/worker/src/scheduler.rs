use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{CopyArguments, ScenarioStatus, Task, TaskKind, TaskRepository, TaskStatus};
use scenario_infrastructure::MetricsCollector;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{error, info, instrument, warn};

use crate::context::WorkerContext;
use crate::handlers::{ProgressReporter, TaskHandlers, TaskOutcome};
use crate::heartbeat::{holder_id, HeartbeatManager};

/// 一次 `start` 调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRunSummary {
    /// 场景中已有存活的 Worker，本次没有执行任何任务
    AlreadyActive { holder: String },
    Completed { dispatched: usize },
}

/// 单个场景的任务调度器
///
/// 按 id 递增顺序逐个执行 Waiting 任务。同一场景只应有一个调度器运行，
/// 该约束依赖存活记录，属于尽力而为的保证。
pub struct WorkerScheduler {
    ctx: WorkerContext,
    scenario: String,
    holder: String,
    handlers: TaskHandlers,
    metrics: Arc<MetricsCollector>,
}

impl WorkerScheduler {
    pub fn new(ctx: WorkerContext, scenario: impl Into<String>) -> Self {
        let scenario = scenario.into();
        let handlers = TaskHandlers::new(&ctx);
        let metrics = Arc::new(MetricsCollector::new(&scenario));
        Self {
            ctx,
            scenario,
            holder: holder_id(),
            handlers,
            metrics,
        }
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// 运行调度器
    ///
    /// 非持续模式下队列为空即返回；持续模式下空闲时休眠，直到收到关闭信号。
    #[instrument(skip(self, shutdown), fields(scenario = %self.scenario))]
    pub async fn start(
        &self,
        continuous: bool,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SchedulerResult<WorkerRunSummary> {
        let registry = &self.ctx.registry;
        registry.require_descriptor(&self.scenario)?;

        let liveness = registry.liveness(&self.scenario).await?;
        let previous = liveness.read().await?;
        if let Some(record) = &previous {
            if record.is_fresh(Utc::now(), self.ctx.worker.liveness_threshold()) {
                info!("场景 {} 已有活跃的 Worker {}，退出", self.scenario, record.holder);
                return Ok(WorkerRunSummary::AlreadyActive {
                    holder: record.holder.clone(),
                });
            }
        }

        let tasks = registry.tasks(&self.scenario).await?;
        let heartbeat = HeartbeatManager::new(
            self.holder.clone(),
            liveness.clone(),
            self.ctx.worker.heartbeat_interval(),
            self.metrics.clone(),
        )
        .start();
        self.metrics.set_worker_active(true);
        info!("Worker {} 开始处理场景 {}", self.holder, self.scenario);

        // 过期的存活记录说明上一个 Worker 没有正常退出
        let reclaimed = match &previous {
            Some(stale) => self.reclaim_orphans(&tasks, &stale.holder).await,
            None => Ok(0),
        };
        let result = match reclaimed {
            Ok(_) => self.poll_loop(&tasks, continuous, &mut shutdown).await,
            Err(e) => Err(e),
        };

        heartbeat.stop().await;
        if let Err(e) = liveness.clear().await {
            warn!("删除场景 {} 的存活记录失败: {}", self.scenario, e);
        }
        self.metrics.set_worker_active(false);

        match &result {
            Ok(dispatched) => info!("Worker 退出，共执行 {} 个任务", dispatched),
            Err(e) => error!("任务账本不可用，Worker 中止: {}", e),
        }
        result.map(|dispatched| WorkerRunSummary::Completed { dispatched })
    }

    /// 失效 Worker 留下的未结束任务标记为失败，复制任务的目标场景恢复为 free
    ///
    /// 未知类型的任务本来就不会结束，保持原样。
    async fn reclaim_orphans(
        &self,
        tasks: &Arc<dyn TaskRepository>,
        previous: &str,
    ) -> SchedulerResult<usize> {
        let mut reclaimed = 0;
        for task in tasks.list_unfinished().await? {
            let Ok(kind) = task.name.parse::<TaskKind>() else {
                continue;
            };
            let message = format!("Worker {previous} died before the task finished");
            match tasks
                .finish(task.id, &TaskStatus::Failed, Some(&message), Utc::now())
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_rejection() || matches!(e, SchedulerError::TaskNotFound { .. }) => {
                    continue
                }
                Err(e) => return Err(e),
            }
            warn!(
                task_id = task.id,
                "任务 '{}' 随失效的 Worker {} 中断，已标记为失败", task.name, previous
            );
            self.metrics.record_task_failure(&task.name, &message);
            reclaimed += 1;

            if kind == TaskKind::CopyScenario {
                if let Ok(args) = CopyArguments::parse(task.arguments_str()) {
                    match self.release_destination(&args.destination).await {
                        Ok(true) => info!("目标场景 {} 已恢复为 free", args.destination),
                        Ok(false) => {}
                        Err(e) => warn!("无法恢复目标场景 {} 的状态: {}", args.destination, e),
                    }
                }
            }
        }
        Ok(reclaimed)
    }

    async fn release_destination(&self, destination: &str) -> SchedulerResult<bool> {
        self.ctx
            .registry
            .scenarios()
            .await?
            .transition_status(destination, &[ScenarioStatus::Busy], ScenarioStatus::Free)
            .await
    }

    async fn poll_loop(
        &self,
        tasks: &Arc<dyn TaskRepository>,
        continuous: bool,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SchedulerResult<usize> {
        let mut dispatched = 0;
        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Lagged(_)) => {
                    info!("收到关闭信号");
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => {}
            }

            let Some(task) = tasks.next_waiting().await? else {
                if !continuous {
                    break;
                }
                let idle = self.ctx.worker.idle_poll_interval();
                tokio::select! {
                    _ = tokio::time::sleep(idle) => {}
                    signal = shutdown.recv() => {
                        if !matches!(signal, Err(RecvError::Closed)) {
                            info!("收到关闭信号");
                            break;
                        }
                        tokio::time::sleep(idle).await;
                    }
                }
                continue;
            };

            self.dispatch(tasks, task).await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// 执行单个任务；只有任务账本写入失败才返回错误
    async fn dispatch(&self, tasks: &Arc<dyn TaskRepository>, task: Task) -> SchedulerResult<()> {
        let kind = match task.name.parse::<TaskKind>() {
            Ok(kind) => kind,
            Err(_) => {
                error!(task_id = task.id, "未知的任务类型 '{}'", task.name);
                let message = format!("Unknown task type '{}'", task.name);
                tasks
                    .mark_started(task.id, Utc::now(), &TaskStatus::progress(0), Some(&message))
                    .await?;
                self.metrics.record_task_failure(&task.name, &message);
                return Ok(());
            }
        };

        let started = Instant::now();
        tasks
            .mark_started(task.id, Utc::now(), &TaskStatus::progress(0), None)
            .await?;
        info!(task_id = task.id, "开始执行任务 '{}' {}", task.name, task.arguments_str());

        let progress = ProgressReporter::new(tasks.clone(), task.id);
        let outcome = self
            .handlers
            .for_kind(kind)
            .handle(&self.scenario, &task, &progress)
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(TaskOutcome::Finished { status, message }) => {
                tasks
                    .finish(task.id, &status, message.as_deref(), Utc::now())
                    .await?;
                self.metrics
                    .record_task_execution(&task.name, &status.to_db_string(), elapsed);
            }
            Ok(TaskOutcome::Detached) => {
                self.metrics
                    .record_task_execution(&task.name, "detached", elapsed);
            }
            Err(e) => {
                let message = e.to_string();
                self.metrics.record_task_failure(&task.name, &message);
                tasks
                    .finish(task.id, &TaskStatus::Failed, Some(&message), Utc::now())
                    .await?;
                self.metrics.record_task_execution(
                    &task.name,
                    &TaskStatus::Failed.to_db_string(),
                    elapsed,
                );
            }
        }
        Ok(())
    }
}
