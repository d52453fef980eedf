//! 外部计划引擎接口

use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::{EngineConfig, ScenarioDescriptor, SchedulerResult};
use scenario_domain::PlanParameters;
use scenario_infrastructure::{CommandRunner, CommandSpec};
use tracing::{debug, info};

/// 引擎以该退出码表示用户取消
pub const USER_CANCELLED_EXIT_CODE: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub exit_code: i32,
    pub log: String,
}

#[async_trait]
pub trait EngineRunner: Send + Sync {
    async fn run_engine(
        &self,
        scenario: &ScenarioDescriptor,
        task_id: i64,
        parameters: &PlanParameters,
    ) -> SchedulerResult<EngineOutcome>;
}

/// 以子进程方式运行引擎，计划参数通过环境变量传递
pub struct SubprocessEngine {
    commands: Arc<dyn CommandRunner>,
    config: EngineConfig,
}

impl SubprocessEngine {
    pub fn new(commands: Arc<dyn CommandRunner>, config: EngineConfig) -> Self {
        Self { commands, config }
    }

    pub fn command_spec(
        &self,
        scenario: &ScenarioDescriptor,
        task_id: i64,
        parameters: &PlanParameters,
    ) -> CommandSpec {
        let mut spec =
            CommandSpec::new(&self.config.command).args(self.config.args.iter().cloned());
        for (key, value) in &parameters.env {
            spec = spec.env(key.clone(), value.clone());
        }
        // 用户变量不能覆盖计划参数与任务标识
        let mut spec = spec
            .env("FREPPLE_PLANTYPE", parameters.plan_type.to_string())
            .env("FREPPLE_CONSTRAINT", parameters.constraint.to_string())
            .env("FREPPLE_TASKID", task_id.to_string())
            .env("FREPPLE_DATABASE", scenario.name.clone());
        if let Some(dir) = &self.config.working_dir {
            spec = spec.working_dir(dir);
        }
        spec
    }
}

#[async_trait]
impl EngineRunner for SubprocessEngine {
    async fn run_engine(
        &self,
        scenario: &ScenarioDescriptor,
        task_id: i64,
        parameters: &PlanParameters,
    ) -> SchedulerResult<EngineOutcome> {
        let spec = self.command_spec(scenario, task_id, parameters);
        info!(
            scenario = %scenario.name,
            task_id,
            constraint = parameters.constraint,
            plan_type = parameters.plan_type,
            "启动计划引擎 {}",
            spec.program
        );
        let output = self.commands.run(&spec).await?;
        debug!(task_id, exit_code = output.exit_code, "计划引擎输出:\n{}", output.log);
        Ok(EngineOutcome {
            exit_code: output.exit_code,
            log: output.log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_environment() {
        let engine = SubprocessEngine::new(
            Arc::new(scenario_infrastructure::ProcessCommandRunner::new()),
            EngineConfig {
                command: "frepple".to_string(),
                args: vec!["--quiet".to_string()],
                working_dir: Some("/srv/plan".to_string()),
                model_command: None,
            },
        );
        let scenario = ScenarioDescriptor::new("s1", "postgres://u@localhost/s1");
        let params = PlanParameters::parse("--constraint=3 --plantype=2 --env=fcst").unwrap();

        let spec = engine.command_spec(&scenario, 17, &params);
        assert_eq!(spec.program, "frepple");
        assert_eq!(spec.args, vec!["--quiet"]);
        assert_eq!(spec.env["FREPPLE_PLANTYPE"], "2");
        assert_eq!(spec.env["FREPPLE_CONSTRAINT"], "3");
        assert_eq!(spec.env["FREPPLE_TASKID"], "17");
        assert_eq!(spec.env["FREPPLE_DATABASE"], "s1");
        assert_eq!(spec.env["fcst"], "1");
        assert_eq!(spec.working_dir.as_deref(), Some(std::path::Path::new("/srv/plan")));
    }

    #[test]
    fn test_user_env_cannot_override_reserved_variables() {
        let engine = SubprocessEngine::new(
            Arc::new(scenario_infrastructure::ProcessCommandRunner::new()),
            EngineConfig::default(),
        );
        let scenario = ScenarioDescriptor::new("s1", "postgres://u@localhost/s1");
        let params = PlanParameters::parse(
            "--plantype=2 --env=FREPPLE_DATABASE=default,FREPPLE_TASKID=1,FREPPLE_PLANTYPE=1,extra",
        )
        .unwrap();

        let spec = engine.command_spec(&scenario, 17, &params);
        assert_eq!(spec.env["FREPPLE_DATABASE"], "s1");
        assert_eq!(spec.env["FREPPLE_TASKID"], "17");
        assert_eq!(spec.env["FREPPLE_PLANTYPE"], "2");
        assert_eq!(spec.env["extra"], "1");
    }
}
