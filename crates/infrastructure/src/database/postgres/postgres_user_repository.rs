use async_trait::async_trait;
use scenario_core::{SchedulerError, SchedulerResult};
use scenario_domain::{User, UserRepository};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::database::USER_COLUMNS;

/// PostgreSQL implementation of UserRepository
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &PgRow) -> SchedulerResult<User> {
        Ok(User {
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            is_superuser: row.try_get("is_superuser")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

fn unique_violation(e: sqlx::Error, what: &str) -> SchedulerError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            SchedulerError::precondition(format!("{what} 已存在"))
        }
        other => SchedulerError::Database(other),
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_username(&self, username: &str) -> SchedulerResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> SchedulerResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1) LIMIT 2");
        let rows = sqlx::query(&sql)
            .bind(email)
            .fetch_all(&self.pool)
            .await?;
        match rows.as_slice() {
            [row] => Self::row_to_user(row).map(Some),
            _ => Ok(None),
        }
    }

    async fn permissions_of(&self, username: &str) -> SchedulerResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT permission FROM user_permissions WHERE username = $1
            UNION
            SELECT gp.permission FROM group_permissions gp
            JOIN user_groups ug ON ug.group_name = gp.group_name
            WHERE ug.username = $1
            ORDER BY permission
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get("permission").map_err(SchedulerError::from))
            .collect()
    }

    async fn create(&self, user: &User) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, is_superuser, is_active) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_superuser)
        .bind(user.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, &format!("用户 {}", user.username)))?;
        Ok(())
    }

    async fn grant_permission(&self, username: &str, permission: &str) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO user_permissions (username, permission) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(username)
        .bind(permission)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_to_group(&self, username: &str, group: &str) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO user_groups (username, group_name) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(username)
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn grant_group_permission(&self, group: &str, permission: &str) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO group_permissions (group_name, permission) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group)
        .bind(permission)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
