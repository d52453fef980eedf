//! 领域实体
//!
//! 场景（Scenario）、任务（Task）、Worker 存活记录以及用户。

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 场景状态
///
/// ```text
/// Free ──copy──▶ Busy ──成功──▶ InUse
///                  │
///                  └──失败──▶ Free
/// InUse ──release──▶ Free
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScenarioStatus {
    Free,
    InUse,
    Busy,
}

impl ScenarioStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Free => "free",
            ScenarioStatus::InUse => "in use",
            ScenarioStatus::Busy => "busy",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "free" => Some(ScenarioStatus::Free),
            "in use" => Some(ScenarioStatus::InUse),
            "busy" => Some(ScenarioStatus::Busy),
            _ => None,
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// 场景：一个具名的逻辑数据库
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub status: ScenarioStatus,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, status: ScenarioStatus) -> Self {
        Self {
            name: name.into(),
            description: None,
            status,
            last_refresh: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_in_use(&self) -> bool {
        self.status == ScenarioStatus::InUse
    }
}

/// 任务状态
///
/// 持久化为自由文本：`Waiting`、`Done`、`Failed`、`Canceled` 或 `45%` 这样的进度值。
/// 无法识别的值原样保留在 `Other` 中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Waiting,
    Progress(u8),
    Done,
    Failed,
    Canceled,
    Other(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    pub fn progress(percent: u8) -> Self {
        TaskStatus::Progress(percent.min(100))
    }

    pub fn from_db_str(value: &str) -> Self {
        match value {
            "Waiting" => TaskStatus::Waiting,
            "Done" => TaskStatus::Done,
            "Failed" => TaskStatus::Failed,
            "Canceled" => TaskStatus::Canceled,
            other => other
                .strip_suffix('%')
                .and_then(|p| p.trim().parse::<u8>().ok())
                .map(TaskStatus::progress)
                .unwrap_or_else(|| TaskStatus::Other(other.to_string())),
        }
    }

    pub fn to_db_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Waiting => f.write_str("Waiting"),
            TaskStatus::Progress(p) => write!(f, "{p}%"),
            TaskStatus::Done => f.write_str("Done"),
            TaskStatus::Failed => f.write_str("Failed"),
            TaskStatus::Canceled => f.write_str("Canceled"),
            TaskStatus::Other(s) => f.write_str(s),
        }
    }
}

/// 任务账本中的一条记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub arguments: Option<String>,
    pub status: TaskStatus,
    pub submitted: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub user: Option<String>,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn arguments_str(&self) -> &str {
        self.arguments.as_deref().unwrap_or_default()
    }
}

/// 待插入的任务记录
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub name: String,
    pub arguments: Option<String>,
    pub status: TaskStatus,
    pub submitted: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub user: Option<String>,
}

impl NewTask {
    /// 提交一个等待执行的任务
    pub fn waiting(
        name: impl Into<String>,
        arguments: Option<String>,
        user: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.filter(|a| !a.trim().is_empty()),
            status: TaskStatus::Waiting,
            submitted: Utc::now(),
            started: None,
            finished: None,
            message: None,
            user,
        }
    }

    /// 基于原任务的提交信息生成一条已结束的记录
    pub fn terminal_copy_of(
        original: &Task,
        status: TaskStatus,
        message: Option<String>,
        finished: DateTime<Utc>,
    ) -> Self {
        Self {
            name: original.name.clone(),
            arguments: original.arguments.clone(),
            status,
            submitted: original.submitted,
            started: original.started.or(Some(finished)),
            finished: Some(finished),
            message,
            user: original.user.clone(),
        }
    }
}

/// Worker 存活记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLiveness {
    pub holder: String,
    pub last_heartbeat: DateTime<Utc>,
}

impl WorkerLiveness {
    /// 心跳年龄不超过阈值即视为存活；时钟回拨造成的未来时间戳同样视为存活
    pub fn is_fresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match (now - self.last_heartbeat).to_std() {
            Ok(age) => age <= threshold,
            Err(_) => true,
        }
    }
}

/// 某个场景中的用户记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// 可代替用户名登录
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_superuser: bool,
    pub is_active: bool,
}

/// 用户在各场景中的能力映射：场景名 → 是否超级用户
///
/// 没有条目的场景表示该用户无权访问。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMap(BTreeMap<String, bool>);

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scenario: impl Into<String>, is_superuser: bool) {
        self.0.insert(scenario.into(), is_superuser);
    }

    pub fn has_access(&self, scenario: &str) -> bool {
        self.0.contains_key(scenario)
    }

    pub fn is_superuser_in(&self, scenario: &str) -> Option<bool> {
        self.0.get(scenario).copied()
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_parsing() {
        assert_eq!(TaskStatus::from_db_str("Waiting"), TaskStatus::Waiting);
        assert_eq!(TaskStatus::from_db_str("99%"), TaskStatus::Progress(99));
        assert_eq!(TaskStatus::from_db_str("Canceled"), TaskStatus::Canceled);
        assert_eq!(
            TaskStatus::from_db_str("Loading data"),
            TaskStatus::Other("Loading data".to_string())
        );
        assert_eq!(TaskStatus::Progress(45).to_string(), "45%");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Waiting.is_terminal());
        assert!(!TaskStatus::Progress(100).is_terminal());
    }

    #[test]
    fn test_scenario_status_db_values() {
        for status in [ScenarioStatus::Free, ScenarioStatus::InUse, ScenarioStatus::Busy] {
            assert_eq!(ScenarioStatus::from_db_str(status.as_db_str()), Some(status));
        }
        assert_eq!(ScenarioStatus::InUse.as_db_str(), "in use");
        assert_eq!(ScenarioStatus::from_db_str("In use"), None);
    }

    #[test]
    fn test_liveness_freshness() {
        let now = Utc::now();
        let threshold = Duration::from_secs(5);
        let fresh = WorkerLiveness {
            holder: "host:1".to_string(),
            last_heartbeat: now - chrono::Duration::seconds(3),
        };
        let stale = WorkerLiveness {
            holder: "host:1".to_string(),
            last_heartbeat: now - chrono::Duration::seconds(6),
        };
        let future = WorkerLiveness {
            holder: "host:1".to_string(),
            last_heartbeat: now + chrono::Duration::seconds(2),
        };
        assert!(fresh.is_fresh(now, threshold));
        assert!(!stale.is_fresh(now, threshold));
        assert!(future.is_fresh(now, threshold));
    }

    #[test]
    fn test_waiting_task_drops_blank_arguments() {
        let task = NewTask::waiting("backup database", Some("  ".to_string()), None);
        assert_eq!(task.arguments, None);
        assert_eq!(task.status, TaskStatus::Waiting);
    }
}
