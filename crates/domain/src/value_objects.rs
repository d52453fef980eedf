use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use scenario_core::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};

/// 任务种类：持久化的任务名称到处理器的封闭映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    GeneratePlan,
    GenerateModel,
    EmptyDatabase,
    LoadDataset,
    CopyScenario,
    BackupDatabase,
    RestoreDatabase,
}

pub const PERM_ADD_TASK: &str = "execute.add_task";
pub const PERM_GENERATE_PLAN: &str = "execute.generate_plan";
pub const PERM_COPY_SCENARIO: &str = "execute.copy_scenario";

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::GeneratePlan,
        TaskKind::GenerateModel,
        TaskKind::EmptyDatabase,
        TaskKind::LoadDataset,
        TaskKind::CopyScenario,
        TaskKind::BackupDatabase,
        TaskKind::RestoreDatabase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::GeneratePlan => "generate plan",
            TaskKind::GenerateModel => "generate model",
            TaskKind::EmptyDatabase => "empty database",
            TaskKind::LoadDataset => "load dataset",
            TaskKind::CopyScenario => "copy scenario",
            TaskKind::BackupDatabase => "backup database",
            TaskKind::RestoreDatabase => "restore database",
        }
    }

    /// 提交该任务所需的权限（超级用户不受限制）
    pub fn required_permission(&self) -> &'static str {
        match self {
            TaskKind::GeneratePlan => PERM_GENERATE_PLAN,
            TaskKind::CopyScenario => PERM_COPY_SCENARIO,
            TaskKind::GenerateModel
            | TaskKind::EmptyDatabase
            | TaskKind::LoadDataset
            | TaskKind::BackupDatabase
            | TaskKind::RestoreDatabase => PERM_ADD_TASK,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SchedulerError::configuration(format!("未知的任务类型: '{s}'")))
    }
}

/// 解析后的任务参数
///
/// 参数字符串由空白分隔的记号组成：`--key=value` 为选项，`--flag` 为开关，
/// 其余为位置参数。双引号可以包裹含空格的值，例如 `--description="Q3 plan"`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskArguments {
    options: BTreeMap<String, Option<String>>,
    positional: Vec<String>,
}

impl TaskArguments {
    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let mut args = TaskArguments::default();
        for token in tokenize(raw)? {
            if let Some(option) = token.strip_prefix("--") {
                if option.is_empty() {
                    return Err(SchedulerError::invalid_params("空的选项名 '--'"));
                }
                match option.split_once('=') {
                    Some((key, value)) => {
                        args.options.insert(key.to_string(), Some(value.to_string()))
                    }
                    None => args.options.insert(option.to_string(), None),
                };
            } else {
                args.positional.push(token);
            }
        }
        Ok(args)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(|v| v.as_deref())
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// 只允许出现给定的选项名
    pub fn ensure_known_options(&self, known: &[&str]) -> SchedulerResult<()> {
        if let Some(unknown) = self.options.keys().find(|k| !known.contains(&k.as_str())) {
            return Err(SchedulerError::invalid_params(format!(
                "未知的选项: --{unknown}"
            )));
        }
        Ok(())
    }

    fn parse_int<T: FromStr>(&self, name: &str, default: T) -> SchedulerResult<T> {
        match self.options.get(name) {
            None => Ok(default),
            Some(None) => Err(SchedulerError::invalid_params(format!(
                "选项 --{name} 需要一个值"
            ))),
            Some(Some(raw)) => raw.parse().map_err(|_| {
                SchedulerError::invalid_params(format!("选项 --{name} 的值无效: '{raw}'"))
            }),
        }
    }
}

fn tokenize(raw: &str) -> SchedulerResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err(SchedulerError::invalid_params("参数中的引号未闭合"));
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// "copy scenario" 的参数：`<source> <destination> [--force] [--description=...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyArguments {
    pub source: String,
    pub destination: String,
    pub force: bool,
    pub description: Option<String>,
}

impl CopyArguments {
    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let args = TaskArguments::parse(raw)?;
        args.ensure_known_options(&["force", "description"])?;
        match args.positional() {
            [source, destination] => Ok(CopyArguments {
                source: source.clone(),
                destination: destination.clone(),
                force: args.flag("force"),
                description: args.value("description").map(|d| d.to_string()),
            }),
            other => Err(SchedulerError::invalid_params(format!(
                "复制场景需要源场景和目标场景两个参数，实际得到 {} 个",
                other.len()
            ))),
        }
    }
}

/// "generate plan" 的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanParameters {
    /// 约束位掩码（0..=15）
    pub constraint: u8,
    /// 1 = 约束计划，2 = 无约束计划
    pub plan_type: u8,
    /// 传递给引擎的环境变量，`--env=K=V,K2` 中无值的键取值 "1"
    pub env: BTreeMap<String, String>,
    pub background: bool,
}

impl Default for PlanParameters {
    fn default() -> Self {
        Self {
            constraint: 15,
            plan_type: 1,
            env: BTreeMap::new(),
            background: false,
        }
    }
}

impl PlanParameters {
    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let args = TaskArguments::parse(raw)?;
        args.ensure_known_options(&["constraint", "plantype", "env", "background"])?;
        if !args.positional().is_empty() {
            return Err(SchedulerError::invalid_params(format!(
                "生成计划不接受位置参数: {:?}",
                args.positional()
            )));
        }

        let constraint: u8 = args.parse_int("constraint", 15)?;
        if constraint > 15 {
            return Err(SchedulerError::invalid_params(format!(
                "约束值必须在 0 到 15 之间: {constraint}"
            )));
        }

        let plan_type: u8 = args.parse_int("plantype", 1)?;
        if !(1..=2).contains(&plan_type) {
            return Err(SchedulerError::invalid_params(format!(
                "计划类型必须为 1 或 2: {plan_type}"
            )));
        }

        let mut env = BTreeMap::new();
        if let Some(raw_env) = args.value("env") {
            for entry in raw_env.split(',').filter(|e| !e.is_empty()) {
                let (key, value) = entry.split_once('=').unwrap_or((entry, "1"));
                if key.is_empty() {
                    return Err(SchedulerError::invalid_params(format!(
                        "无效的环境变量定义: '{entry}'"
                    )));
                }
                env.insert(key.to_string(), value.to_string());
            }
        }

        Ok(PlanParameters {
            constraint,
            plan_type,
            env,
            background: args.flag("background"),
        })
    }
}

/// "generate model" 的参数：模型生成器的规模选项
///
/// 规模选项都是非负整数，`--currentdate` 为 `YYYY-MM-DD`。只保留显式给出的选项，
/// 其余由生成器使用自己的默认值。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub options: BTreeMap<String, String>,
}

impl ModelParameters {
    pub const SIZE_OPTIONS: [&'static str; 10] = [
        "cluster",
        "demand",
        "forecast_per_item",
        "level",
        "resource",
        "resource_size",
        "components",
        "components_per",
        "deliver_lt",
        "procure_lt",
    ];

    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let args = TaskArguments::parse(raw)?;
        let mut known = Self::SIZE_OPTIONS.to_vec();
        known.push("currentdate");
        args.ensure_known_options(&known)?;
        if !args.positional().is_empty() {
            return Err(SchedulerError::invalid_params(format!(
                "生成模型不接受位置参数: {:?}",
                args.positional()
            )));
        }

        let mut options = BTreeMap::new();
        for name in Self::SIZE_OPTIONS {
            if args.options.contains_key(name) {
                let value: u32 = args.parse_int(name, 0)?;
                options.insert(name.to_string(), value.to_string());
            }
        }
        if args.options.contains_key("currentdate") {
            let raw = args.value("currentdate").unwrap_or_default();
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                SchedulerError::invalid_params(format!(
                    "选项 --currentdate 必须是 YYYY-MM-DD 格式: '{raw}'"
                ))
            })?;
            options.insert("currentdate".to_string(), raw.to_string());
        }
        Ok(ModelParameters { options })
    }

    /// 生成器的命令行参数，按选项名排序
    pub fn command_args(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|(key, value)| format!("--{key}={value}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_names() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
        let err = "generate_plan".parse::<TaskKind>().unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_required_permissions_use_execute_names() {
        assert_eq!(TaskKind::GeneratePlan.required_permission(), "execute.generate_plan");
        assert_eq!(TaskKind::CopyScenario.required_permission(), "execute.copy_scenario");
        for kind in [
            TaskKind::GenerateModel,
            TaskKind::EmptyDatabase,
            TaskKind::LoadDataset,
            TaskKind::BackupDatabase,
            TaskKind::RestoreDatabase,
        ] {
            assert_eq!(kind.required_permission(), "execute.add_task");
        }
    }

    #[test]
    fn test_model_parameters() {
        let params =
            ModelParameters::parse("--cluster=10 --demand=5 --currentdate=2024-02-29").unwrap();
        assert_eq!(
            params.command_args(),
            vec!["--cluster=10", "--currentdate=2024-02-29", "--demand=5"]
        );
        assert!(ModelParameters::parse("").unwrap().command_args().is_empty());

        assert!(ModelParameters::parse("--cluster=-1").is_err());
        assert!(ModelParameters::parse("--level").is_err());
        assert!(ModelParameters::parse("--currentdate=2024-13-01").is_err());
        assert!(ModelParameters::parse("--currentdate").is_err());
        assert!(ModelParameters::parse("--size=3").is_err());
        assert!(ModelParameters::parse("big").is_err());
    }

    #[test]
    fn test_argument_tokens() {
        let args =
            TaskArguments::parse(r#"default s1 --force --description="Q3 what-if""#).unwrap();
        assert_eq!(args.positional(), &["default".to_string(), "s1".to_string()]);
        assert!(args.flag("force"));
        assert_eq!(args.value("description"), Some("Q3 what-if"));
        assert_eq!(args.value("force"), None);
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        assert!(TaskArguments::parse(r#"--description="oops"#).is_err());
    }

    #[test]
    fn test_copy_arguments() {
        let copy = CopyArguments::parse("default scenario1 --force").unwrap();
        assert_eq!(copy.source, "default");
        assert_eq!(copy.destination, "scenario1");
        assert!(copy.force);
        assert_eq!(copy.description, None);

        assert!(CopyArguments::parse("default").is_err());
        assert!(CopyArguments::parse("a b --overwrite").is_err());
    }

    #[test]
    fn test_plan_parameters_defaults() {
        let params = PlanParameters::parse("").unwrap();
        assert_eq!(params, PlanParameters::default());
    }

    #[test]
    fn test_plan_parameters_parsing() {
        let params =
            PlanParameters::parse("--constraint=5 --plantype=2 --env=fcst,supply=1 --background")
                .unwrap();
        assert_eq!(params.constraint, 5);
        assert_eq!(params.plan_type, 2);
        assert_eq!(params.env.get("fcst").map(String::as_str), Some("1"));
        assert_eq!(params.env.get("supply").map(String::as_str), Some("1"));
        assert!(params.background);
    }

    #[test]
    fn test_plan_parameters_out_of_range() {
        assert!(PlanParameters::parse("--constraint=16").is_err());
        assert!(PlanParameters::parse("--plantype=3").is_err());
        assert!(PlanParameters::parse("--constraint=abc").is_err());
        assert!(PlanParameters::parse("--constraint").is_err());
    }
}
