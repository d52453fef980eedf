//! 场景生命周期操作：复制、备份、恢复
//!
//! 只作为任务处理器的一部分被调用。复制期间目标场景处于 `Busy`，
//! 任何失败都会把目标场景放回 `Free`；备份与恢复不改变场景状态。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local, Utc};
use scenario_core::{
    ConnectionParams, DatabaseEngine, LifecycleConfig, ScenarioDescriptor, SchedulerError,
    SchedulerResult, WorkerConfig,
};
use scenario_domain::{CopyArguments, Scenario, ScenarioRegistry, ScenarioStatus};
use scenario_infrastructure::{CommandRunner, CommandSpec};
use tracing::{debug, info, instrument, warn};

const BACKUP_PREFIX: &str = "database.";
const BACKUP_SUFFIX: &str = ".dump";

/// `database.<scenario>.<YYYYmmdd.HHMMSS>.dump`
pub fn backup_file_name(scenario: &str, at: DateTime<Local>) -> String {
    format!(
        "{BACKUP_PREFIX}{scenario}.{}{BACKUP_SUFFIX}",
        at.format("%Y%m%d.%H%M%S")
    )
}

/// pg_dump/psql 的连接参数
struct PgTarget {
    args: Vec<String>,
    database: String,
    password: Option<String>,
}

impl PgTarget {
    fn of(descriptor: &ScenarioDescriptor) -> SchedulerResult<Self> {
        match descriptor.connection_params()? {
            ConnectionParams::PostgreSQL {
                user,
                password,
                host,
                port,
                database,
            } => {
                let mut args = Vec::new();
                if !user.is_empty() {
                    args.push(format!("--username={user}"));
                }
                if let Some(host) = host {
                    args.push(format!("--host={host}"));
                }
                if let Some(port) = port {
                    args.push(format!("--port={port}"));
                }
                Ok(Self {
                    args,
                    database,
                    password,
                })
            }
            ConnectionParams::SQLite { .. } => Err(SchedulerError::configuration(format!(
                "场景 '{}' 不是 PostgreSQL 数据库",
                descriptor.name
            ))),
        }
    }

    /// 追加连接参数与数据库名，密码通过 PGPASSWORD 传递
    fn apply(&self, spec: CommandSpec) -> CommandSpec {
        let spec = spec.args(self.args.iter().cloned()).arg(&self.database);
        match &self.password {
            Some(password) => spec.env("PGPASSWORD", password.clone()),
            None => spec,
        }
    }
}

fn sqlite_path(descriptor: &ScenarioDescriptor) -> SchedulerResult<PathBuf> {
    match descriptor.connection_params()? {
        ConnectionParams::SQLite { path } => Ok(PathBuf::from(path)),
        ConnectionParams::PostgreSQL { .. } => Err(SchedulerError::configuration(format!(
            "场景 '{}' 不是 SQLite 数据库",
            descriptor.name
        ))),
    }
}

pub struct ScenarioLifecycle {
    registry: Arc<dyn ScenarioRegistry>,
    commands: Arc<dyn CommandRunner>,
    config: LifecycleConfig,
    liveness_threshold: Duration,
}

impl ScenarioLifecycle {
    pub fn new(
        registry: Arc<dyn ScenarioRegistry>,
        commands: Arc<dyn CommandRunner>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            registry,
            commands,
            config,
            liveness_threshold: WorkerConfig::default().liveness_threshold(),
        }
    }

    /// 判断目标场景是否有存活 Worker 的阈值，与调度器使用同一配置
    pub fn with_liveness_threshold(mut self, threshold: Duration) -> Self {
        self.liveness_threshold = threshold;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        Path::new(&self.config.backup_dir)
    }

    /// 不访问数据库的参数校验，提交任务时同样使用
    pub fn validate_copy<'a>(
        registry: &'a dyn ScenarioRegistry,
        args: &CopyArguments,
    ) -> SchedulerResult<(&'a ScenarioDescriptor, &'a ScenarioDescriptor)> {
        let source = registry.descriptor(&args.source).ok_or_else(|| {
            SchedulerError::configuration(format!("未配置源场景 '{}'", args.source))
        })?;
        let destination = registry.descriptor(&args.destination).ok_or_else(|| {
            SchedulerError::configuration(format!("未配置目标场景 '{}'", args.destination))
        })?;
        if args.source == args.destination {
            return Err(SchedulerError::configuration("不能把场景复制到自身"));
        }
        if source.engine() != destination.engine() {
            return Err(SchedulerError::configuration(format!(
                "源场景与目标场景的数据库引擎不同: {} / {}",
                source.engine().as_str(),
                destination.engine().as_str()
            )));
        }
        if registry.is_default(&args.destination) {
            return Err(SchedulerError::precondition("不能覆盖默认场景"));
        }
        Ok((source, destination))
    }

    #[instrument(skip(self, args), fields(source = %args.source, destination = %args.destination))]
    pub async fn copy(&self, args: &CopyArguments) -> SchedulerResult<Scenario> {
        let (source, destination) = Self::validate_copy(self.registry.as_ref(), args)?;
        let scenarios = self.registry.scenarios().await?;

        let source_row = scenarios
            .find(&args.source)
            .await?
            .ok_or_else(|| SchedulerError::scenario_not_found(&args.source))?;
        if source_row.status != ScenarioStatus::InUse {
            return Err(SchedulerError::precondition(format!(
                "源场景 '{}' 未在使用中 ({})",
                args.source, source_row.status
            )));
        }

        let destination_row = scenarios
            .find(&args.destination)
            .await?
            .ok_or_else(|| SchedulerError::scenario_not_found(&args.destination))?;
        // 有 Worker 正在处理目标场景时不能覆盖其数据库，强制复制也不行
        if let Some(record) = self
            .registry
            .liveness(&args.destination)
            .await?
            .read()
            .await?
        {
            if record.is_fresh(Utc::now(), self.liveness_threshold) {
                return Err(SchedulerError::precondition(format!(
                    "目标场景 '{}' 有活跃的 Worker {}",
                    args.destination, record.holder
                )));
            }
        }
        let allowed: &[ScenarioStatus] = if args.force {
            &[ScenarioStatus::Free, ScenarioStatus::InUse, ScenarioStatus::Busy]
        } else {
            &[ScenarioStatus::Free]
        };
        if !scenarios
            .transition_status(&args.destination, allowed, ScenarioStatus::Busy)
            .await?
        {
            return Err(SchedulerError::precondition(format!(
                "目标场景 '{}' 不是空闲状态 ({})",
                args.destination, destination_row.status
            )));
        }
        info!("目标场景 {} 已标记为 busy，开始复制", args.destination);

        let result = async {
            self.copy_data(source, destination).await?;
            // 复制过来的存活记录属于源场景的 Worker
            self.registry.liveness(&args.destination).await?.clear().await?;

            let refreshed = Scenario {
                name: args.destination.clone(),
                description: Some(
                    args.description
                        .clone()
                        .unwrap_or_else(|| format!("Copied from scenario '{}'", args.source)),
                ),
                status: ScenarioStatus::InUse,
                last_refresh: Some(Utc::now()),
            };
            scenarios.update(&refreshed).await?;
            Ok::<_, SchedulerError>(refreshed)
        }
        .await;

        if let Err(e) = &result {
            warn!("复制到场景 {} 失败: {}", args.destination, e);
            match scenarios
                .transition_status(&args.destination, &[ScenarioStatus::Busy], ScenarioStatus::Free)
                .await
            {
                Ok(_) => info!("目标场景 {} 已恢复为 free", args.destination),
                Err(reset) => warn!("无法恢复目标场景 {} 的状态: {}", args.destination, reset),
            }
        }
        result
    }

    async fn copy_data(
        &self,
        source: &ScenarioDescriptor,
        destination: &ScenarioDescriptor,
    ) -> SchedulerResult<()> {
        match source.engine() {
            DatabaseEngine::PostgreSQL => {
                let from = PgTarget::of(source)?;
                let to = PgTarget::of(destination)?;
                tokio::fs::create_dir_all(self.backup_dir()).await?;
                let dump = self.backup_dir().join(format!(
                    "copy.{}.{}.{}.sql",
                    source.name,
                    destination.name,
                    Local::now().format("%Y%m%d.%H%M%S")
                ));
                let result = self.pipe_through_dump(&from, &to, &dump).await;
                if let Err(e) = tokio::fs::remove_file(&dump).await {
                    debug!("删除临时转储文件 {} 失败: {}", dump.display(), e);
                }
                result
            }
            DatabaseEngine::SQLite => {
                let from = sqlite_path(source)?;
                let to = sqlite_path(destination)?;
                self.registry.disconnect(&destination.name).await;
                tokio::fs::copy(&from, &to).await?;
                debug!("已复制数据库文件 {} -> {}", from.display(), to.display());
                Ok(())
            }
        }
    }

    async fn pipe_through_dump(
        &self,
        from: &PgTarget,
        to: &PgTarget,
        dump: &Path,
    ) -> SchedulerResult<()> {
        let dump_spec =
            from.apply(CommandSpec::new(&self.config.pg_dump_command).args(["-c", "-Fp"]))
                .stdout_file(dump);
        self.run_checked(&dump_spec).await?;

        let load_spec = to
            .apply(CommandSpec::new(&self.config.psql_command).arg("-q"))
            .stdin_file(dump);
        self.run_checked(&load_spec).await
    }

    /// 备份场景数据库，返回生成的备份文件路径
    #[instrument(skip(self))]
    pub async fn backup(&self, scenario: &str) -> SchedulerResult<PathBuf> {
        let descriptor = self.registry.require_descriptor(scenario)?;
        tokio::fs::create_dir_all(self.backup_dir()).await?;
        let artifact = self
            .backup_dir()
            .join(backup_file_name(scenario, Local::now()));

        let result = match descriptor.engine() {
            DatabaseEngine::PostgreSQL => {
                let target = PgTarget::of(descriptor)?;
                let spec = target
                    .apply(CommandSpec::new(&self.config.pg_dump_command).args(["-b", "-w"]))
                    .stdout_file(&artifact);
                self.run_checked(&spec).await
            }
            DatabaseEngine::SQLite => {
                let path = sqlite_path(descriptor)?;
                tokio::fs::copy(&path, &artifact)
                    .await
                    .map(|_| ())
                    .map_err(SchedulerError::from)
            }
        };

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&artifact).await;
            return Err(e);
        }
        info!("场景 {} 已备份到 {}", scenario, artifact.display());
        Ok(artifact)
    }

    /// 删除超过保留天数的备份文件，返回删除的数量
    pub async fn prune_backups(&self) -> SchedulerResult<usize> {
        let retention = Duration::from_secs(self.config.retention_days.max(0) as u64 * 86_400);
        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.prune_backups_before(cutoff).await
    }

    pub async fn prune_backups_before(&self, cutoff: SystemTime) -> SchedulerResult<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(self.backup_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(BACKUP_PREFIX) || !name.ends_with(BACKUP_SUFFIX) {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("无法读取备份文件 {} 的修改时间: {}", name, e);
                    continue;
                }
            };
            if modified < cutoff {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        removed += 1;
                        debug!("已删除过期备份 {}", name);
                    }
                    Err(e) => warn!("删除过期备份 {} 失败: {}", name, e),
                }
            }
        }
        Ok(removed)
    }

    /// 备份文件必须是备份目录中已存在的文件名
    pub async fn resolve_artifact(&self, artifact: &str) -> SchedulerResult<PathBuf> {
        if artifact.is_empty() {
            return Err(SchedulerError::invalid_params("No dump file specified"));
        }
        if artifact.contains('/') || artifact.contains('\\') || artifact == ".." {
            return Err(SchedulerError::invalid_params(format!(
                "备份文件名不能包含路径: '{artifact}'"
            )));
        }
        let path = self.backup_dir().join(artifact);
        if !tokio::fs::try_exists(&path).await? {
            return Err(SchedulerError::precondition(format!(
                "Dump file not found: {artifact}"
            )));
        }
        Ok(path)
    }

    /// 只支持 PostgreSQL 场景
    pub fn ensure_restorable(&self, scenario: &str) -> SchedulerResult<()> {
        PgTarget::of(self.registry.require_descriptor(scenario)?).map(|_| ())
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, scenario: &str, artifact: &Path) -> SchedulerResult<()> {
        let target = PgTarget::of(self.registry.require_descriptor(scenario)?)?;
        let spec = target
            .apply(CommandSpec::new(&self.config.psql_command).arg("-q"))
            .stdin_file(artifact);
        self.run_checked(&spec).await?;
        info!("场景 {} 已从 {} 恢复", scenario, artifact.display());
        Ok(())
    }

    async fn run_checked(&self, spec: &CommandSpec) -> SchedulerResult<()> {
        let output = self.commands.run(spec).await?;
        if !output.success() {
            warn!("{} 输出:\n{}", spec.program, output.log);
            return Err(SchedulerError::ExternalCommand {
                program: spec.program.clone(),
                code: output.exit_code,
            });
        }
        Ok(())
    }
}
