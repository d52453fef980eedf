pub mod pool;
pub mod postgres;
pub mod registry;
pub mod sqlite;

pub use pool::DatabasePool;
pub use postgres::{
    PostgresLivenessRepository, PostgresMaintenanceRepository, PostgresScenarioRepository,
    PostgresTaskRepository, PostgresUserRepository,
};
pub use registry::DatabaseScenarioRegistry;
pub use sqlite::{
    SqliteLivenessRepository, SqliteMaintenanceRepository, SqliteScenarioRepository,
    SqliteTaskRepository, SqliteUserRepository,
};

/// `system_state` 表中保存 Worker 心跳的键
pub const WORKER_ALIVE_KEY: &str = "worker_alive";

/// 任务行的公共列列表
pub(crate) const TASK_COLUMNS: &str =
    "id, name, arguments, status, submitted, started, finished, message, username";

/// 用户行的公共列列表
pub(crate) const USER_COLUMNS: &str = "username, email, password_hash, is_superuser, is_active";
