//! 外部命令执行
//!
//! pg_dump、psql 以及计划引擎都以子进程方式调用，退出码是唯一的成功信号。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use scenario_core::SchedulerResult;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// 一次外部命令调用的描述
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// 作为标准输入的文件
    pub stdin_file: Option<PathBuf>,
    /// 标准输出重定向到的文件
    pub stdout_file: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    pub fn stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(path.into());
        self
    }
}

/// 外部命令的执行结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// 被信号终止时为 -1
    pub exit_code: i32,
    /// 未重定向到文件时的标准输出，以及全部标准错误
    pub log: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> SchedulerResult<CommandOutput>;
}

/// 基于 tokio::process 的实现
#[derive(Debug, Default, Clone)]
pub struct ProcessCommandRunner;

impl ProcessCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    #[instrument(skip(self, spec), fields(program = %spec.program))]
    async fn run(&self, spec: &CommandSpec) -> SchedulerResult<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env).kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        match &spec.stdin_file {
            Some(path) => command.stdin(File::open(path).await?.into_std().await),
            None => command.stdin(Stdio::null()),
        };
        match &spec.stdout_file {
            Some(path) => command.stdout(File::create(path).await?.into_std().await),
            None => command.stdout(Stdio::piped()),
        };
        command.stderr(Stdio::piped());

        debug!("执行外部命令: {} {:?}", spec.program, spec.args);
        let mut child = command.spawn()?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                out.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(err) = stderr.as_mut() {
                err.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let (out, err) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;

        let mut log = String::from_utf8_lossy(&out).into_owned();
        log.push_str(&String::from_utf8_lossy(&err));

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            log,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_code_and_output() {
        let runner = ProcessCommandRunner::new();
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo hello; echo oops 1>&2; exit 3");
        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert!(output.log.contains("hello"));
        assert!(output.log.contains("oops"));
    }

    #[tokio::test]
    async fn test_stdin_and_stdout_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output_file = dir.path().join("out.txt");
        std::fs::write(&input, "payload").unwrap();

        let runner = ProcessCommandRunner::new();
        let spec = CommandSpec::new("cat")
            .stdin_file(&input)
            .stdout_file(&output_file);
        let output = runner.run(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(std::fs::read_to_string(&output_file).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_missing_stdin_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessCommandRunner::new();
        let spec = CommandSpec::new("cat").stdin_file(dir.path().join("absent.sql"));
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, scenario_core::SchedulerError::Io(_)));
    }

    #[tokio::test]
    async fn test_environment_is_passed() {
        let runner = ProcessCommandRunner::new();
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("test \"$PGPASSWORD\" = secret")
            .env("PGPASSWORD", "secret");
        assert!(runner.run(&spec).await.unwrap().success());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let runner = ProcessCommandRunner::new();
        let spec = CommandSpec::new("definitely-not-a-real-program-xyz");
        assert!(runner.run(&spec).await.is_err());
    }
}
