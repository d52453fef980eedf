use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use scenario_core::AppConfig;
use scenario_domain::{ScenarioRegistry, ScenarioService};
use scenario_worker::TaskSubmitter;

use crate::auth::AuthService;
use crate::handlers::{
    auth::login,
    health::{health_check, metrics},
    scenarios::{list_scenarios, release_scenario, sync_scenarios, update_description},
    tasks::{get_task, list_tasks, submit_task},
    worker::worker_status,
};
use crate::routing::ScenarioRouting;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn ScenarioRegistry>,
    pub scenarios: Arc<ScenarioService>,
    pub submitter: Arc<TaskSubmitter>,
    pub auth: Arc<AuthService>,
    pub routing: ScenarioRouting,
    pub liveness_threshold: Duration,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        registry: Arc<dyn ScenarioRegistry>,
        submitter: TaskSubmitter,
    ) -> Self {
        Self {
            scenarios: Arc::new(ScenarioService::new(registry.clone())),
            submitter: Arc::new(submitter),
            auth: Arc::new(AuthService::new(
                registry.clone(),
                chrono::Duration::minutes(config.api.session_ttl_minutes),
            )),
            routing: ScenarioRouting::new(registry.clone()),
            liveness_threshold: config.worker.liveness_threshold(),
            metrics: None,
            registry,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// 创建API路由（不含场景路由层）
pub fn create_routes(state: AppState, metrics_endpoint: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(metrics_endpoint, get(metrics))
        .route("/api/auth/login", post(login))
        .route("/api/scenarios", get(list_scenarios))
        .route("/api/scenarios/sync", post(sync_scenarios))
        .route("/api/scenarios/{name}/release", post(release_scenario))
        .route("/api/scenarios/{name}/description", post(update_description))
        .route("/api/tasks", get(list_tasks).post(submit_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/worker", get(worker_status))
        .with_state(state)
}
