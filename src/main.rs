use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use scenario_core::{init_logging, AppConfig};
use scenario_scheduler::app::{AppMode, Application, RunOptions};
use scenario_scheduler::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use tracing::{info, warn};

/// 多场景任务队列与数据库路由系统
#[derive(Debug, Parser)]
#[command(name = "scenario-scheduler", version)]
struct Cli {
    /// 配置文件路径，缺省时按默认位置查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value_t = AppMode::Api)]
    mode: AppMode,

    /// Worker 处理的场景（仅 worker 模式）
    #[arg(short, long, value_name = "NAME")]
    scenario: Option<String>,

    /// 队列为空时持续等待新任务（仅 worker 模式）
    #[arg(long)]
    continuous: bool,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "加载配置文件失败: {}",
            cli.config.as_deref().unwrap_or("<默认位置>")
        )
    })?;

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    let log_format = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动多场景任务调度系统，模式: {:?}", cli.mode);

    let app = Application::new(config, cli.mode).await?;
    let shutdown = ShutdownManager::new();
    let options = RunOptions {
        scenario: cli.scenario,
        continuous: cli.continuous,
    };

    let run = app.run(options, &shutdown);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
            shutdown.shutdown();
        }
    }

    match tokio::time::timeout(Duration::from_secs(30), run).await {
        Ok(result) => result?,
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("多场景任务调度系统已退出");
    Ok(())
}
