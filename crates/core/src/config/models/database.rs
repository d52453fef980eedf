use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 数据库引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseEngine {
    PostgreSQL,
    SQLite,
}

impl DatabaseEngine {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseEngine::PostgreSQL
        } else {
            DatabaseEngine::SQLite
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseEngine::PostgreSQL => "postgresql",
            DatabaseEngine::SQLite => "sqlite",
        }
    }
}

/// 单个场景的静态连接定义
///
/// 场景集合在进程启动时从配置读取一次，之后只能通过重启或显式同步变更。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    pub name: String,
    pub url: String,
}

impl ScenarioDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn engine(&self) -> DatabaseEngine {
        DatabaseEngine::from_url(&self.url)
    }

    /// 解析连接参数，供 pg_dump/psql 等外部工具使用
    pub fn connection_params(&self) -> SchedulerResult<ConnectionParams> {
        ConnectionParams::parse(&self.url)
    }

    /// 场景名同时用作URL前缀，只允许字母、数字、下划线和连字符
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("场景名称不能为空"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(anyhow::anyhow!(
                "场景名称 '{}' 只能包含字母、数字、下划线和连字符",
                self.name
            ));
        }
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("场景 '{}' 的数据库URL不能为空", self.name));
        }
        ConnectionParams::parse(&self.url)
            .map_err(|e| anyhow::anyhow!("场景 '{}' 的数据库URL无效: {}", self.name, e))?;
        Ok(())
    }
}

/// 连接参数
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionParams {
    PostgreSQL {
        user: String,
        password: Option<String>,
        host: Option<String>,
        port: Option<u16>,
        database: String,
    },
    SQLite {
        path: String,
    },
}

impl ConnectionParams {
    pub fn parse(url: &str) -> SchedulerResult<Self> {
        match DatabaseEngine::from_url(url) {
            DatabaseEngine::PostgreSQL => {
                let parsed = url::Url::parse(url)
                    .map_err(|e| SchedulerError::configuration(format!("无法解析URL {url}: {e}")))?;
                let database = parsed.path().trim_start_matches('/').to_string();
                if database.is_empty() {
                    return Err(SchedulerError::configuration(format!(
                        "URL {url} 未指定数据库名"
                    )));
                }
                Ok(ConnectionParams::PostgreSQL {
                    user: parsed.username().to_string(),
                    password: parsed.password().map(|p| p.to_string()),
                    host: parsed.host_str().map(|h| h.to_string()),
                    port: parsed.port(),
                    database,
                })
            }
            DatabaseEngine::SQLite => {
                let rest = url
                    .strip_prefix("sqlite://")
                    .or_else(|| url.strip_prefix("sqlite:"))
                    .unwrap_or(url);
                let path = rest.split('?').next().unwrap_or_default().to_string();
                if path.is_empty() {
                    return Err(SchedulerError::configuration(format!(
                        "URL {url} 未指定数据库文件"
                    )));
                }
                Ok(ConnectionParams::SQLite { path })
            }
        }
    }
}

/// 连接池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connection_timeout_seconds: 30,
        }
    }
}

impl DatabasePoolConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }
        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }
        Ok(())
    }
}
