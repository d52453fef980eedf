use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use metrics_exporter_prometheus::PrometheusHandle;
use scenario_api::{create_app, AppState};
use scenario_core::AppConfig;
use scenario_domain::{ScenarioRegistry, SyncReport};
use scenario_infrastructure::{init_metrics, DatabaseScenarioRegistry, ProcessCommandRunner};
use scenario_worker::{
    InProcessWorkerLauncher, TaskSubmitter, WorkerContext, WorkerRunSummary, WorkerScheduler,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::shutdown::ShutdownManager;

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppMode {
    /// HTTP API，提交任务时按需在进程内拉起 Worker
    Api,
    /// 单个场景的 Worker 调度器
    Worker,
    /// 只把配置同步到场景表后退出
    Sync,
}

/// 运行参数
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker 模式下的场景，缺省为默认场景
    pub scenario: Option<String>,
    /// Worker 在队列为空时继续等待新任务
    pub continuous: bool,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    registry: Arc<DatabaseScenarioRegistry>,
    sync_report: SyncReport,
    metrics: Option<PrometheusHandle>,
}

impl Application {
    /// 连接默认场景并同步场景表
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let metrics = if config.observability.metrics_enabled && mode != AppMode::Sync {
            Some(init_metrics().context("初始化指标导出器失败")?)
        } else {
            None
        };

        let (registry, sync_report) = DatabaseScenarioRegistry::initialize(&config)
            .await
            .context("初始化场景注册表失败")?;

        Ok(Self {
            config,
            mode,
            registry,
            sync_report,
            metrics,
        })
    }

    pub async fn run(&self, options: RunOptions, shutdown: &ShutdownManager) -> Result<()> {
        let result = match self.mode {
            AppMode::Sync => {
                info!(
                    "场景同步完成: 新增 {:?}, 删除 {:?}, 修复 {:?}",
                    self.sync_report.added, self.sync_report.removed, self.sync_report.repaired
                );
                Ok(())
            }
            AppMode::Worker => self.run_worker(options, shutdown).await,
            AppMode::Api => self.run_api(shutdown).await,
        };

        self.registry.close_all().await;
        result
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext::from_config(
            &self.config,
            self.registry.clone(),
            Arc::new(ProcessCommandRunner::new()),
        )
    }

    async fn run_worker(&self, options: RunOptions, shutdown: &ShutdownManager) -> Result<()> {
        let scenario = options
            .scenario
            .unwrap_or_else(|| self.registry.default_scenario().to_string());
        info!(
            continuous = options.continuous,
            "启动场景 {} 的 Worker", scenario
        );

        let summary = WorkerScheduler::new(self.worker_context(), scenario.as_str())
            .start(options.continuous, shutdown.subscribe())
            .await
            .with_context(|| format!("场景 {scenario} 的 Worker 运行失败"))?;

        match summary {
            WorkerRunSummary::AlreadyActive { holder } => {
                warn!("场景 {} 已有活跃的 Worker: {}", scenario, holder)
            }
            WorkerRunSummary::Completed { dispatched } => {
                info!("场景 {} 的 Worker 已停止，共执行 {} 个任务", scenario, dispatched)
            }
        }
        Ok(())
    }

    async fn run_api(&self, shutdown: &ShutdownManager) -> Result<()> {
        if !self.config.api.enabled {
            return Err(anyhow::anyhow!("API模式被禁用，请检查配置"));
        }

        let registry: Arc<dyn ScenarioRegistry> = self.registry.clone();
        let mut submitter = TaskSubmitter::new(registry.clone());
        if self.config.api.spawn_worker_on_submit {
            submitter = submitter.with_launcher(Arc::new(InProcessWorkerLauncher::new(
                self.worker_context(),
                shutdown.sender(),
            )));
        }

        let mut state = AppState::new(&self.config, registry, submitter);
        if let Some(handle) = &self.metrics {
            state = state.with_metrics(handle.clone());
        }
        let app = create_app(
            state,
            &self.config.api,
            &self.config.observability.metrics_endpoint,
        );

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("API服务器监听: {}", self.config.api.bind_address);

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }
}
