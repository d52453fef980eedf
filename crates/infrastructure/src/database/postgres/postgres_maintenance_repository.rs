use std::path::Path;

use async_trait::async_trait;
use scenario_core::SchedulerResult;
use scenario_domain::MaintenanceRepository;
use sqlx::PgPool;
use tracing::debug;

pub struct PostgresMaintenanceRepository {
    pool: PgPool,
}

impl PostgresMaintenanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MaintenanceRepository for PostgresMaintenanceRepository {
    async fn flush_tables(&self, tables: &[String]) -> SchedulerResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for table in tables {
            // 表名在配置加载时已校验为标识符
            let result = sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        debug!("已清空 {} 张表，共 {} 行", tables.len(), deleted);
        Ok(deleted)
    }

    async fn execute_script(&self, script: &Path) -> SchedulerResult<()> {
        let sql = tokio::fs::read_to_string(script).await?;
        sqlx::raw_sql(&sql).execute(&self.pool).await?;
        Ok(())
    }
}
