use std::sync::Arc;

use scenario_core::{AppConfig, EngineConfig, LifecycleConfig, MaintenanceConfig, WorkerConfig};
use scenario_domain::ScenarioRegistry;
use scenario_infrastructure::CommandRunner;

use crate::engine::{EngineRunner, SubprocessEngine};

/// Worker 及其任务处理器共享的依赖
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<dyn ScenarioRegistry>,
    pub commands: Arc<dyn CommandRunner>,
    pub engine: Arc<dyn EngineRunner>,
    pub engine_config: EngineConfig,
    pub worker: WorkerConfig,
    pub lifecycle: LifecycleConfig,
    pub maintenance: MaintenanceConfig,
}

impl WorkerContext {
    /// 引擎使用配置中的子进程实现
    pub fn from_config(
        config: &AppConfig,
        registry: Arc<dyn ScenarioRegistry>,
        commands: Arc<dyn CommandRunner>,
    ) -> Self {
        let engine = Arc::new(SubprocessEngine::new(commands.clone(), config.engine.clone()));
        Self {
            registry,
            commands,
            engine,
            engine_config: config.engine.clone(),
            worker: config.worker.clone(),
            lifecycle: config.lifecycle.clone(),
            maintenance: config.maintenance.clone(),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn EngineRunner>) -> Self {
        self.engine = engine;
        self
    }
}
