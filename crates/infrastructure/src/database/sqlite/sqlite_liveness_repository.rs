use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scenario_core::SchedulerResult;
use scenario_domain::{LivenessRepository, WorkerLiveness};
use sqlx::{Row, SqlitePool};

use crate::database::WORKER_ALIVE_KEY;

pub struct SqliteLivenessRepository {
    pool: SqlitePool,
}

impl SqliteLivenessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LivenessRepository for SqliteLivenessRepository {
    async fn read(&self) -> SchedulerResult<Option<WorkerLiveness>> {
        let row = sqlx::query("SELECT value, updated_at FROM system_state WHERE key = $1")
            .bind(WORKER_ALIVE_KEY)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(WorkerLiveness {
                holder: row.try_get("value")?,
                last_heartbeat: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn beat(&self, holder: &str, at: DateTime<Utc>) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_state (key, value, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(WORKER_ALIVE_KEY)
        .bind(holder)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM system_state WHERE key = $1")
            .bind(WORKER_ALIVE_KEY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
