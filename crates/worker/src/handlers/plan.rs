use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scenario_core::SchedulerResult;
use scenario_domain::{PlanParameters, ScenarioRegistry, Task, TaskStatus};
use tracing::{error, info};

use super::{ProgressReporter, TaskHandler, TaskOutcome};
use crate::engine::{EngineRunner, USER_CANCELLED_EXIT_CODE};

/// 引擎退出码到任务终态的映射
pub fn plan_status(exit_code: i32) -> (TaskStatus, Option<String>) {
    match exit_code {
        0 => (TaskStatus::Done, None),
        USER_CANCELLED_EXIT_CODE => (TaskStatus::Canceled, Some("Cancelled by user".to_string())),
        code => (
            TaskStatus::Failed,
            Some(format!("Failed with exit code {code}")),
        ),
    }
}

/// "generate plan"
pub struct GeneratePlanHandler {
    registry: Arc<dyn ScenarioRegistry>,
    engine: Arc<dyn EngineRunner>,
}

impl GeneratePlanHandler {
    pub fn new(registry: Arc<dyn ScenarioRegistry>, engine: Arc<dyn EngineRunner>) -> Self {
        Self { registry, engine }
    }
}

#[async_trait]
impl TaskHandler for GeneratePlanHandler {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        _progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome> {
        let params = PlanParameters::parse(task.arguments_str())?;
        let descriptor = self.registry.require_descriptor(scenario)?.clone();

        if !params.background {
            let outcome = self.engine.run_engine(&descriptor, task.id, &params).await?;
            let (status, message) = plan_status(outcome.exit_code);
            return Ok(TaskOutcome::Finished { status, message });
        }

        // 后台模式：引擎结束后由这里写入终态
        let tasks = self.registry.tasks(scenario).await?;
        let engine = self.engine.clone();
        let task_id = task.id;
        tokio::spawn(async move {
            let (status, message) = match engine.run_engine(&descriptor, task_id, &params).await {
                Ok(outcome) => plan_status(outcome.exit_code),
                Err(e) => (TaskStatus::Failed, Some(e.to_string())),
            };
            if let Err(e) = tasks
                .finish(task_id, &status, message.as_deref(), Utc::now())
                .await
            {
                error!("无法写入后台计划任务 {} 的结果: {}", task_id, e);
            }
        });
        info!("计划任务 {} 已转入后台运行", task.id);
        Ok(TaskOutcome::Detached)
    }
}
