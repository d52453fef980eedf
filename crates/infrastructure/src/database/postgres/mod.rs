pub mod postgres_liveness_repository;
pub mod postgres_maintenance_repository;
pub mod postgres_scenario_repository;
pub mod postgres_task_repository;
pub mod postgres_user_repository;

pub use postgres_liveness_repository::PostgresLivenessRepository;
pub use postgres_maintenance_repository::PostgresMaintenanceRepository;
pub use postgres_scenario_repository::PostgresScenarioRepository;
pub use postgres_task_repository::PostgresTaskRepository;
pub use postgres_user_repository::PostgresUserRepository;

use scenario_core::SchedulerResult;
use sqlx::PgPool;
use tracing::debug;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scenarios (
        name VARCHAR(300) PRIMARY KEY,
        description VARCHAR(500),
        status VARCHAR(10) NOT NULL DEFAULT 'free',
        last_refresh TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(50) NOT NULL,
        arguments TEXT,
        status VARCHAR(20) NOT NULL,
        submitted TIMESTAMPTZ NOT NULL,
        started TIMESTAMPTZ,
        finished TIMESTAMPTZ,
        message TEXT,
        username VARCHAR(150)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    r#"
    CREATE TABLE IF NOT EXISTS system_state (
        key VARCHAR(100) PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        username VARCHAR(150) PRIMARY KEY,
        email VARCHAR(254),
        password_hash VARCHAR(255) NOT NULL,
        is_superuser BOOLEAN NOT NULL DEFAULT FALSE,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        username VARCHAR(150) NOT NULL,
        permission VARCHAR(100) NOT NULL,
        PRIMARY KEY (username, permission)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_groups (
        username VARCHAR(150) NOT NULL,
        group_name VARCHAR(150) NOT NULL,
        PRIMARY KEY (username, group_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_permissions (
        group_name VARCHAR(150) NOT NULL,
        permission VARCHAR(100) NOT NULL,
        PRIMARY KEY (group_name, permission)
    )
    "#,
];

pub async fn run_migrations(pool: &PgPool) -> SchedulerResult<()> {
    debug!("Running PostgreSQL database migrations");
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
