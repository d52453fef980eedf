use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 心跳写入间隔，必须小于存活阈值
    pub heartbeat_interval_seconds: u64,
    /// 心跳超过该时长即视为没有活跃的 Worker
    pub liveness_threshold_seconds: u64,
    /// 持续模式下队列为空时的休眠间隔
    pub idle_poll_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 2,
            liveness_threshold_seconds: 5,
            idle_poll_interval_seconds: 5,
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn liveness_threshold(&self) -> Duration {
        Duration::from_secs(self.liveness_threshold_seconds)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_interval_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        if self.liveness_threshold_seconds <= self.heartbeat_interval_seconds {
            return Err(anyhow::anyhow!(
                "存活阈值({}秒)必须大于心跳间隔({}秒)",
                self.liveness_threshold_seconds,
                self.heartbeat_interval_seconds
            ));
        }
        if self.idle_poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("空闲轮询间隔必须大于0"));
        }
        Ok(())
    }
}
