use thiserror::Error;

/// 调度器错误类型定义
///
/// 错误按处理方式分为几类：
///
/// - 配置错误（未知场景、引擎不兼容等）：在任何状态变更之前同步拒绝
/// - 前置条件错误（场景状态不满足、任务已处于终态）：同步拒绝，任务保持不变
/// - 执行错误（外部命令失败、处理器异常）：在任务边界捕获并记录为 `Failed`
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("场景未找到: {name}")]
    ScenarioNotFound { name: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("前置条件不满足: {0}")]
    Precondition(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("外部命令 {program} 执行失败，退出码 {code}")]
    ExternalCommand { program: String, code: i32 },

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("认证错误: {0}")]
    Authentication(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SchedulerError::Configuration(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        SchedulerError::Precondition(msg.into())
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        SchedulerError::InvalidTaskParams(msg.into())
    }

    pub fn scenario_not_found(name: impl Into<String>) -> Self {
        SchedulerError::ScenarioNotFound { name: name.into() }
    }

    /// 是否属于提交阶段即可拒绝的错误（配置或前置条件类）
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_)
                | SchedulerError::Precondition(_)
                | SchedulerError::InvalidTaskParams(_)
                | SchedulerError::ScenarioNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(SchedulerError::configuration("unknown scenario").is_rejection());
        assert!(SchedulerError::precondition("not free").is_rejection());
        assert!(SchedulerError::scenario_not_found("s9").is_rejection());
        assert!(!SchedulerError::ExternalCommand {
            program: "pg_dump".to_string(),
            code: 1
        }
        .is_rejection());
        assert!(!SchedulerError::Internal("boom".to_string()).is_rejection());
    }

    #[test]
    fn test_error_display() {
        let err = SchedulerError::ExternalCommand {
            program: "psql".to_string(),
            code: 3,
        };
        assert_eq!(err.to_string(), "外部命令 psql 执行失败，退出码 3");

        let err = SchedulerError::TaskNotFound { id: 42 };
        assert_eq!(err.to_string(), "任务未找到: 42");
    }
}
