use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::{EngineConfig, SchedulerError, SchedulerResult};
use scenario_domain::{ModelParameters, ScenarioRegistry, Task, TaskStatus};
use scenario_infrastructure::{CommandRunner, CommandSpec};
use tracing::{debug, info, warn};

use super::{ProgressReporter, TaskHandler, TaskOutcome};

/// "generate model"：清空业务表后运行模型生成器
///
/// 生成器通过 `--key=value` 参数接收规模选项，通过环境变量得知场景与任务 id。
pub struct GenerateModelHandler {
    registry: Arc<dyn ScenarioRegistry>,
    commands: Arc<dyn CommandRunner>,
    config: EngineConfig,
    tables: Vec<String>,
}

impl GenerateModelHandler {
    pub fn new(
        registry: Arc<dyn ScenarioRegistry>,
        commands: Arc<dyn CommandRunner>,
        config: EngineConfig,
        tables: Vec<String>,
    ) -> Self {
        Self {
            registry,
            commands,
            config,
            tables,
        }
    }

    fn command_spec(
        &self,
        program: &str,
        scenario: &str,
        task_id: i64,
        params: &ModelParameters,
    ) -> CommandSpec {
        let spec = CommandSpec::new(program)
            .args(params.command_args())
            .env("FREPPLE_DATABASE", scenario)
            .env("FREPPLE_TASKID", task_id.to_string());
        match &self.config.working_dir {
            Some(dir) => spec.working_dir(dir),
            None => spec,
        }
    }
}

#[async_trait]
impl TaskHandler for GenerateModelHandler {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome> {
        let params = ModelParameters::parse(task.arguments_str())?;
        let program = self.config.model_command.as_deref().ok_or_else(|| {
            SchedulerError::configuration("未配置模型生成器命令 engine.model_command")
        })?;

        let deleted = self
            .registry
            .maintenance(scenario)
            .await?
            .flush_tables(&self.tables)
            .await?;
        debug!("场景 {} 生成模型前删除了 {} 行", scenario, deleted);
        progress.report(10).await?;

        let spec = self.command_spec(program, scenario, task.id, &params);
        info!(task_id = task.id, "启动模型生成器 {} {:?}", spec.program, spec.args);
        let output = self.commands.run(&spec).await?;
        if output.success() {
            return Ok(TaskOutcome::done(format!(
                "Generated model with {} options",
                params.options.len()
            )));
        }
        warn!("{} 输出:\n{}", spec.program, output.log);
        Ok(TaskOutcome::Finished {
            status: TaskStatus::Failed,
            message: Some(format!(
                "Model generator failed with exit code {}",
                output.exit_code
            )),
        })
    }
}
