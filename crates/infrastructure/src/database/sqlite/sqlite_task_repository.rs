use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{NewTask, Task, TaskRepository, TaskStatus};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::TASK_COLUMNS;

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
        let status: String = row.try_get("status")?;
        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            arguments: row.try_get("arguments")?,
            status: TaskStatus::from_db_str(&status),
            submitted: row.try_get("submitted")?,
            started: row.try_get("started")?,
            finished: row.try_get("finished")?,
            message: row.try_get("message")?,
            user: row.try_get("username")?,
        })
    }

    /// 更新未命中时区分“任务不存在”与“任务已结束”
    async fn explain_missed_update(&self, id: i64) -> SchedulerError {
        match self.find_by_id(id).await {
            Ok(Some(_)) => SchedulerError::precondition(format!("任务 {id} 已处于终态")),
            Ok(None) => SchedulerError::TaskNotFound { id },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_name = %task.name))]
    async fn insert(&self, task: &NewTask) -> SchedulerResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO tasks (name, arguments, status, submitted, started, finished, message, username)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&task.name)
        .bind(&task.arguments)
        .bind(task.status.to_db_string())
        .bind(task.submitted)
        .bind(task.started)
        .bind(task.finished)
        .bind(&task.message)
        .bind(&task.user)
        .fetch_one(&self.pool)
        .await?;
        let id: i64 = row.try_get("id")?;
        debug!("任务已写入账本: {}", id);
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn next_waiting(&self) -> SchedulerResult<Option<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = $1 ORDER BY id LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(TaskStatus::Waiting.to_db_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn mark_started(
        &self,
        id: i64,
        at: DateTime<Utc>,
        status: &TaskStatus,
        message: Option<&str>,
    ) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET started = COALESCE(started, $1), status = $2, message = COALESCE($3, message)
            WHERE id = $4 AND finished IS NULL
            "#,
        )
        .bind(at)
        .bind(status.to_db_string())
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.explain_missed_update(id).await);
        }
        Ok(())
    }

    async fn update_progress(&self, id: i64, status: &TaskStatus) -> SchedulerResult<()> {
        sqlx::query("UPDATE tasks SET status = $1 WHERE id = $2 AND finished IS NULL")
            .bind(status.to_db_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn finish(
        &self,
        id: i64,
        status: &TaskStatus,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        if !status.is_terminal() {
            return Err(SchedulerError::invalid_params(format!(
                "结束任务需要终态，实际为 '{status}'"
            )));
        }
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $1, message = $2, finished = $3, started = COALESCE(started, $3)
            WHERE id = $4 AND finished IS NULL
            "#,
        )
        .bind(status.to_db_string())
        .bind(message)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.explain_missed_update(id).await);
        }
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> SchedulerResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id DESC LIMIT $1");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn list_unfinished(&self) -> SchedulerResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE started IS NOT NULL AND finished IS NULL ORDER BY id"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }
}
