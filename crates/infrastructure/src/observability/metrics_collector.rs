//! Worker 与生命周期操作的指标
//!
//! 未安装全局 recorder 时 `metrics` 宏是空操作，因此测试中可以直接构造。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::{debug, warn};

pub struct MetricsCollector {
    tasks_dispatched_total: Counter,
    tasks_failed_total: Counter,
    task_duration: Histogram,
    heartbeats_total: Counter,
    worker_active: Gauge,
    scenario: String,
}

impl MetricsCollector {
    pub fn new(scenario: &str) -> Self {
        Self {
            tasks_dispatched_total: counter!(
                "scenario_tasks_dispatched_total",
                "scenario" => scenario.to_string()
            ),
            tasks_failed_total: counter!(
                "scenario_tasks_failed_total",
                "scenario" => scenario.to_string()
            ),
            task_duration: histogram!(
                "scenario_task_duration_seconds",
                "scenario" => scenario.to_string()
            ),
            heartbeats_total: counter!(
                "scenario_worker_heartbeats_total",
                "scenario" => scenario.to_string()
            ),
            worker_active: gauge!(
                "scenario_worker_active",
                "scenario" => scenario.to_string()
            ),
            scenario: scenario.to_string(),
        }
    }

    /// Record a task execution completion
    pub fn record_task_execution(&self, task_name: &str, status: &str, duration_seconds: f64) {
        self.tasks_dispatched_total.increment(1);
        self.task_duration.record(duration_seconds);
        counter!(
            "scenario_task_outcomes_total",
            "scenario" => self.scenario.clone(),
            "task" => task_name.to_string(),
            "status" => status.to_string()
        )
        .increment(1);

        debug!(
            scenario = %self.scenario,
            task_name = task_name,
            status = status,
            duration_seconds = duration_seconds,
            "Task execution completed"
        );
    }

    /// Record a task failure
    pub fn record_task_failure(&self, task_name: &str, error: &str) {
        self.tasks_failed_total.increment(1);

        warn!(
            scenario = %self.scenario,
            task_name = task_name,
            error = error,
            "Task execution failed"
        );
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats_total.increment(1);
    }

    pub fn set_worker_active(&self, active: bool) {
        self.worker_active.set(if active { 1.0 } else { 0.0 });
    }
}
