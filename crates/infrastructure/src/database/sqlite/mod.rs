pub mod sqlite_liveness_repository;
pub mod sqlite_maintenance_repository;
pub mod sqlite_scenario_repository;
pub mod sqlite_task_repository;
pub mod sqlite_user_repository;

pub use sqlite_liveness_repository::SqliteLivenessRepository;
pub use sqlite_maintenance_repository::SqliteMaintenanceRepository;
pub use sqlite_scenario_repository::SqliteScenarioRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_user_repository::SqliteUserRepository;

use scenario_core::SchedulerResult;
use sqlx::SqlitePool;
use tracing::debug;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scenarios (
        name TEXT PRIMARY KEY,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'free',
        last_refresh DATETIME
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        arguments TEXT,
        status TEXT NOT NULL,
        submitted DATETIME NOT NULL,
        started DATETIME,
        finished DATETIME,
        message TEXT,
        username TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    r#"
    CREATE TABLE IF NOT EXISTS system_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY,
        email TEXT,
        password_hash TEXT NOT NULL,
        is_superuser BOOLEAN NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        username TEXT NOT NULL,
        permission TEXT NOT NULL,
        PRIMARY KEY (username, permission)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_groups (
        username TEXT NOT NULL,
        group_name TEXT NOT NULL,
        PRIMARY KEY (username, group_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_permissions (
        group_name TEXT NOT NULL,
        permission TEXT NOT NULL,
        PRIMARY KEY (group_name, permission)
    )
    "#,
];

/// 创建场景数据库所需的全部表（幂等）
pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("Running SQLite database migrations");
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
