use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use scenario_core::{
    ConnectionParams, DatabaseEngine, DatabasePoolConfig, ScenarioDescriptor, SchedulerResult,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

use super::{postgres, sqlite};

/// 单个场景数据库的连接池
#[derive(Clone)]
pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

impl DatabasePool {
    /// 按URL自动识别引擎建立连接池，并确保表结构存在
    pub async fn connect(
        descriptor: &ScenarioDescriptor,
        config: &DatabasePoolConfig,
    ) -> SchedulerResult<Self> {
        let timeout = Duration::from_secs(config.connection_timeout_seconds);

        let pool = match descriptor.engine() {
            DatabaseEngine::PostgreSQL => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(timeout)
                    .connect(&descriptor.url)
                    .await?;
                DatabasePool::PostgreSQL(pool)
            }
            DatabaseEngine::SQLite => {
                let in_memory = descriptor.url.contains(":memory:");
                if !in_memory {
                    if let ConnectionParams::SQLite { path } = descriptor.connection_params()? {
                        if let Some(parent) = Path::new(&path).parent() {
                            if !parent.as_os_str().is_empty() {
                                tokio::fs::create_dir_all(parent).await?;
                            }
                        }
                    }
                }

                // 场景复制与备份直接拷贝数据库文件，不能有未合并的 WAL
                let options = SqliteConnectOptions::from_str(&descriptor.url)?
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Delete)
                    .busy_timeout(timeout);

                // 内存数据库每个连接都是独立实例，只能保留一个常驻连接
                let mut pool_options = SqlitePoolOptions::new().acquire_timeout(timeout);
                pool_options = if in_memory {
                    pool_options
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    pool_options.max_connections(config.max_connections)
                };

                DatabasePool::SQLite(pool_options.connect_with(options).await?)
            }
        };

        pool.run_migrations().await?;
        debug!("场景 {} 数据库连接已建立", descriptor.name);
        Ok(pool)
    }

    pub fn engine(&self) -> DatabaseEngine {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseEngine::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseEngine::SQLite,
        }
    }

    pub async fn run_migrations(&self) -> SchedulerResult<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => postgres::run_migrations(pool).await,
            DatabasePool::SQLite(pool) => sqlite::run_migrations(pool).await,
        }
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
        }
    }
}
