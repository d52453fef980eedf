use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::{DatabasePoolConfig, ScenarioDescriptor},
    lifecycle::{EngineConfig, LifecycleConfig, MaintenanceConfig},
    worker::WorkerConfig,
};

pub const DEFAULT_SCENARIO_NAME: &str = "default";

fn default_scenario_name() -> String {
    DEFAULT_SCENARIO_NAME.to_string()
}

fn default_scenarios() -> Vec<ScenarioDescriptor> {
    vec![ScenarioDescriptor::new(
        DEFAULT_SCENARIO_NAME,
        "sqlite://data/default.db",
    )]
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 默认（生产）场景名称，该场景没有URL前缀
    #[serde(default = "default_scenario_name")]
    pub default_scenario: String,
    /// 场景连接定义，顺序即路由匹配顺序
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioDescriptor>,
    #[serde(default)]
    pub database: DatabasePoolConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_scenario: default_scenario_name(),
            scenarios: default_scenarios(),
            database: DatabasePoolConfig::default(),
            worker: WorkerConfig::default(),
            lifecycle: LifecycleConfig::default(),
            engine: EngineConfig::default(),
            maintenance: MaintenanceConfig::default(),
            api: ApiConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults (serde defaults of every section)
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: SCENARIO_, nested keys separated by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/scenarios.toml",
                "scenarios.toml",
                "/etc/scenario-scheduler/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SCENARIO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioDescriptor> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.validate_scenarios().context("场景配置验证失败")?;
        self.database.validate().context("数据库配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.lifecycle.validate().context("生命周期配置验证失败")?;
        self.engine.validate().context("计划引擎配置验证失败")?;
        self.maintenance.validate().context("数据维护配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }

    fn validate_scenarios(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(anyhow::anyhow!("至少需要配置一个场景"));
        }

        let mut seen = HashSet::new();
        for descriptor in &self.scenarios {
            descriptor.validate()?;
            if !seen.insert(descriptor.name.as_str()) {
                return Err(anyhow::anyhow!("场景名称重复: {}", descriptor.name));
            }
        }

        if !seen.contains(self.default_scenario.as_str()) {
            return Err(anyhow::anyhow!(
                "默认场景 '{}' 未在场景列表中定义",
                self.default_scenario
            ));
        }

        Ok(())
    }
}
