use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scenario_domain::LivenessRepository;
use scenario_infrastructure::MetricsCollector;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// 周期性刷新场景的 Worker 存活记录
///
/// 与轮询循环是两个独立的 tokio 任务，只通过存活记录交互；
/// 长时间运行的任务处理器不会阻塞心跳。
pub struct HeartbeatManager {
    holder: String,
    liveness: Arc<dyn LivenessRepository>,
    interval: Duration,
    metrics: Arc<MetricsCollector>,
}

/// 运行中的心跳任务
pub struct HeartbeatHandle {
    stop_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// 停止心跳并等待任务退出
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.join.await {
            error!("心跳任务异常退出: {}", e);
        }
    }
}

/// `hostname:pid`
pub fn holder_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}

impl HeartbeatManager {
    pub fn new(
        holder: String,
        liveness: Arc<dyn LivenessRepository>,
        interval: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            holder,
            liveness,
            interval,
            metrics,
        }
    }

    /// 启动心跳任务；第一次心跳立即写入
    pub fn start(self) -> HeartbeatHandle {
        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let join = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            info!("心跳任务已启动: {}", self.holder);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.liveness.beat(&self.holder, Utc::now()).await {
                            Ok(()) => {
                                self.metrics.record_heartbeat();
                                debug!("心跳已写入: {}", self.holder);
                            }
                            Err(e) => error!("写入心跳失败: {}", e),
                        }
                    }
                    _ = stop_rx.recv() => {
                        info!("心跳任务正在关闭");
                        break;
                    }
                }
            }
        });
        HeartbeatHandle { stop_tx, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_testing_utils::MockLivenessRepository;

    #[tokio::test]
    async fn test_heartbeat_beats_until_stopped() {
        let liveness = MockLivenessRepository::new();
        let handle = HeartbeatManager::new(
            "host:1".to_string(),
            Arc::new(liveness.clone()),
            Duration::from_millis(10),
            Arc::new(MetricsCollector::new("default")),
        )
        .start();

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;
        let beats = liveness.beat_count();
        assert!(beats >= 2);
        assert_eq!(liveness.current().unwrap().holder, "host:1");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(liveness.beat_count(), beats);
    }

    #[test]
    fn test_holder_id_contains_pid() {
        assert!(holder_id().ends_with(&format!(":{}", std::process::id())));
    }
}
