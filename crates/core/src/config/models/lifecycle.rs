use serde::{Deserialize, Serialize};

/// 场景生命周期操作（备份、恢复、复制）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// 备份文件存放目录
    pub backup_dir: String,
    /// 备份保留天数，超过该天数的备份在下一次备份时清理
    pub retention_days: i64,
    pub pg_dump_command: String,
    pub psql_command: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            backup_dir: "logs".to_string(),
            retention_days: 31,
            pg_dump_command: "pg_dump".to_string(),
            psql_command: "psql".to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backup_dir.is_empty() {
            return Err(anyhow::anyhow!("备份目录不能为空"));
        }
        if self.retention_days <= 0 {
            return Err(anyhow::anyhow!("备份保留天数必须大于0"));
        }
        if self.pg_dump_command.is_empty() || self.psql_command.is_empty() {
            return Err(anyhow::anyhow!("pg_dump/psql 命令不能为空"));
        }
        Ok(())
    }
}

/// 外部计划引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    /// "generate model" 调用的模型生成器，未配置时该类任务失败
    pub model_command: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "frepple".to_string(),
            args: Vec::new(),
            working_dir: None,
            model_command: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.command.is_empty() {
            return Err(anyhow::anyhow!("计划引擎命令不能为空"));
        }
        if self.model_command.as_deref() == Some("") {
            return Err(anyhow::anyhow!("模型生成器命令不能为空"));
        }
        Ok(())
    }
}

/// 数据维护配置（清空数据库、加载数据集）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// "empty database" 任务清空的业务表，按顺序执行
    pub flush_tables: Vec<String>,
    /// "load dataset" 任务查找 `<name>.sql` 的目录
    pub fixtures_dir: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            flush_tables: Vec::new(),
            fixtures_dir: "fixtures".to_string(),
        }
    }
}

impl MaintenanceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for table in &self.flush_tables {
            if table.is_empty()
                || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(anyhow::anyhow!("无效的表名: '{}'", table));
            }
        }
        Ok(())
    }
}
