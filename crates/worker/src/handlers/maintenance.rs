use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{ScenarioRegistry, Task, TaskArguments};
use tracing::info;

use super::{ProgressReporter, TaskHandler, TaskOutcome};

/// "empty database"：清空配置中的业务表
pub struct EmptyDatabaseHandler {
    registry: Arc<dyn ScenarioRegistry>,
    tables: Vec<String>,
}

impl EmptyDatabaseHandler {
    pub fn new(registry: Arc<dyn ScenarioRegistry>, tables: Vec<String>) -> Self {
        Self { registry, tables }
    }
}

#[async_trait]
impl TaskHandler for EmptyDatabaseHandler {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        _progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome> {
        let args = TaskArguments::parse(task.arguments_str())?;
        args.ensure_known_options(&[])?;

        let deleted = self
            .registry
            .maintenance(scenario)
            .await?
            .flush_tables(&self.tables)
            .await?;
        info!(
            "场景 {} 已清空 {} 张表，共删除 {} 行",
            scenario,
            self.tables.len(),
            deleted
        );
        Ok(TaskOutcome::done(format!(
            "Deleted {deleted} rows from {} tables",
            self.tables.len()
        )))
    }
}

/// "load dataset"：按顺序执行 `<fixtures_dir>/<name>.sql`
pub struct LoadDatasetHandler {
    registry: Arc<dyn ScenarioRegistry>,
    fixtures_dir: PathBuf,
}

impl LoadDatasetHandler {
    pub fn new(registry: Arc<dyn ScenarioRegistry>, fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            fixtures_dir: fixtures_dir.into(),
        }
    }

    async fn resolve(&self, name: &str) -> SchedulerResult<PathBuf> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SchedulerError::invalid_params(format!(
                "无效的数据集名称: '{name}'"
            )));
        }
        let path = self.fixtures_dir.join(format!("{name}.sql"));
        if !tokio::fs::try_exists(&path).await? {
            return Err(SchedulerError::TaskExecution(format!(
                "Fixture '{name}' not found"
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl TaskHandler for LoadDatasetHandler {
    async fn handle(
        &self,
        scenario: &str,
        task: &Task,
        progress: &ProgressReporter,
    ) -> SchedulerResult<TaskOutcome> {
        let args = TaskArguments::parse(task.arguments_str())?;
        args.ensure_known_options(&[])?;
        let names = args.positional();
        if names.is_empty() {
            return Err(SchedulerError::invalid_params("未指定要加载的数据集"));
        }

        // 先确认全部数据集都存在，避免加载到一半才失败
        let mut scripts = Vec::with_capacity(names.len());
        for name in names {
            scripts.push(self.resolve(name).await?);
        }

        let maintenance = self.registry.maintenance(scenario).await?;
        let total = scripts.len();
        for (index, script) in scripts.iter().enumerate() {
            maintenance.execute_script(script).await?;
            info!("场景 {} 已加载数据集 {}", scenario, script.display());
            if index + 1 < total {
                progress
                    .report(((index + 1) * 100 / total) as u8)
                    .await?;
            }
        }
        Ok(TaskOutcome::done(format!("Loaded {}", names.join(", "))))
    }
}
