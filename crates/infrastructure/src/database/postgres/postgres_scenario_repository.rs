use async_trait::async_trait;
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{Scenario, ScenarioRepository, ScenarioStatus};
use sqlx::{postgres::PgRow, PgPool, Row};

pub struct PostgresScenarioRepository {
    pool: PgPool,
}

impl PostgresScenarioRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_scenario(row: &PgRow) -> SchedulerResult<Scenario> {
        let status: String = row.try_get("status")?;
        Ok(Scenario {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            status: ScenarioStatus::from_db_str(&status).ok_or_else(|| {
                SchedulerError::DatabaseOperation(format!("无效的场景状态: '{status}'"))
            })?,
            last_refresh: row.try_get("last_refresh")?,
        })
    }
}

#[async_trait]
impl ScenarioRepository for PostgresScenarioRepository {
    async fn list(&self) -> SchedulerResult<Vec<Scenario>> {
        let rows = sqlx::query(
            "SELECT name, description, status, last_refresh FROM scenarios ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_scenario).collect()
    }

    async fn find(&self, name: &str) -> SchedulerResult<Option<Scenario>> {
        let row = sqlx::query(
            "SELECT name, description, status, last_refresh FROM scenarios WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_scenario).transpose()
    }

    async fn insert(&self, scenario: &Scenario) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO scenarios (name, description, status, last_refresh) VALUES ($1, $2, $3, $4)",
        )
        .bind(&scenario.name)
        .bind(&scenario.description)
        .bind(scenario.status.as_db_str())
        .bind(scenario.last_refresh)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, scenario: &Scenario) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE scenarios SET description = $1, status = $2, last_refresh = $3 WHERE name = $4",
        )
        .bind(&scenario.description)
        .bind(scenario.status.as_db_str())
        .bind(scenario.last_refresh)
        .bind(&scenario.name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SchedulerError::scenario_not_found(&scenario.name));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM scenarios WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition_status(
        &self,
        name: &str,
        from: &[ScenarioStatus],
        to: ScenarioStatus,
    ) -> SchedulerResult<bool> {
        let candidates: Vec<String> = from.iter().map(|s| s.as_db_str().to_string()).collect();
        let result =
            sqlx::query("UPDATE scenarios SET status = $1 WHERE name = $2 AND status = ANY($3)")
                .bind(to.as_db_str())
                .bind(name)
                .bind(candidates)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
