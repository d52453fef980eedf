use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use scenario_core::{AppConfig, DatabasePoolConfig, ScenarioDescriptor, SchedulerResult};
use scenario_domain::{
    LivenessRepository, MaintenanceRepository, ScenarioRegistry, ScenarioRepository,
    ScenarioService, SyncReport, TaskRepository, UserRepository,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::pool::DatabasePool;
use super::postgres::{
    PostgresLivenessRepository, PostgresMaintenanceRepository, PostgresScenarioRepository,
    PostgresTaskRepository, PostgresUserRepository,
};
use super::sqlite::{
    SqliteLivenessRepository, SqliteMaintenanceRepository, SqliteScenarioRepository,
    SqliteTaskRepository, SqliteUserRepository,
};

/// 基于数据库的场景注册表
///
/// 每个场景的连接池在首次访问时建立并缓存。
pub struct DatabaseScenarioRegistry {
    default_scenario: String,
    descriptors: Vec<ScenarioDescriptor>,
    pool_config: DatabasePoolConfig,
    pools: RwLock<HashMap<String, DatabasePool>>,
}

impl DatabaseScenarioRegistry {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            default_scenario: config.default_scenario.clone(),
            descriptors: config.scenarios.clone(),
            pool_config: config.database.clone(),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// 构造注册表、连接默认场景并将配置同步到 `scenarios` 表
    pub async fn initialize(config: &AppConfig) -> SchedulerResult<(Arc<Self>, SyncReport)> {
        let registry = Arc::new(Self::new(config));
        registry.pool(&registry.default_scenario).await?;
        let report = ScenarioService::new(registry.clone()).sync().await?;
        info!(
            "场景注册表初始化完成，共 {} 个场景",
            registry.descriptors.len()
        );
        Ok((registry, report))
    }

    /// 获取（必要时建立）场景的连接池
    pub async fn pool(&self, scenario: &str) -> SchedulerResult<DatabasePool> {
        if let Some(pool) = self.pools.read().await.get(scenario) {
            return Ok(pool.clone());
        }

        let descriptor = self.require_descriptor(scenario)?;
        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(scenario) {
            return Ok(pool.clone());
        }
        let pool = DatabasePool::connect(descriptor, &self.pool_config).await?;
        pools.insert(scenario.to_string(), pool.clone());
        Ok(pool)
    }

    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            debug!("场景 {} 连接池已关闭", name);
        }
    }
}

#[async_trait]
impl ScenarioRegistry for DatabaseScenarioRegistry {
    fn default_scenario(&self) -> &str {
        &self.default_scenario
    }

    fn descriptors(&self) -> &[ScenarioDescriptor] {
        &self.descriptors
    }

    async fn scenarios(&self) -> SchedulerResult<Arc<dyn ScenarioRepository>> {
        let repo: Arc<dyn ScenarioRepository> = match self.pool(&self.default_scenario).await? {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresScenarioRepository::new(pool)),
            DatabasePool::SQLite(pool) => Arc::new(SqliteScenarioRepository::new(pool)),
        };
        Ok(repo)
    }

    async fn tasks(&self, scenario: &str) -> SchedulerResult<Arc<dyn TaskRepository>> {
        let repo: Arc<dyn TaskRepository> = match self.pool(scenario).await? {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresTaskRepository::new(pool)),
            DatabasePool::SQLite(pool) => Arc::new(SqliteTaskRepository::new(pool)),
        };
        Ok(repo)
    }

    async fn liveness(&self, scenario: &str) -> SchedulerResult<Arc<dyn LivenessRepository>> {
        let repo: Arc<dyn LivenessRepository> = match self.pool(scenario).await? {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresLivenessRepository::new(pool)),
            DatabasePool::SQLite(pool) => Arc::new(SqliteLivenessRepository::new(pool)),
        };
        Ok(repo)
    }

    async fn users(&self, scenario: &str) -> SchedulerResult<Arc<dyn UserRepository>> {
        let repo: Arc<dyn UserRepository> = match self.pool(scenario).await? {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresUserRepository::new(pool)),
            DatabasePool::SQLite(pool) => Arc::new(SqliteUserRepository::new(pool)),
        };
        Ok(repo)
    }

    async fn maintenance(
        &self,
        scenario: &str,
    ) -> SchedulerResult<Arc<dyn MaintenanceRepository>> {
        let repo: Arc<dyn MaintenanceRepository> = match self.pool(scenario).await? {
            DatabasePool::PostgreSQL(pool) => Arc::new(PostgresMaintenanceRepository::new(pool)),
            DatabasePool::SQLite(pool) => Arc::new(SqliteMaintenanceRepository::new(pool)),
        };
        Ok(repo)
    }

    async fn disconnect(&self, scenario: &str) {
        if let Some(pool) = self.pools.write().await.remove(scenario) {
            pool.close().await;
            debug!("场景 {} 连接池已断开", scenario);
        }
    }
}
