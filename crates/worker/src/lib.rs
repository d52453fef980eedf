//! 场景 Worker
//!
//! 每个场景一个调度器：轮询任务账本中最早的 Waiting 任务，分派到对应的
//! 处理器执行，同时由独立的心跳任务维护场景的存活记录。

pub mod context;
pub mod engine;
pub mod handlers;
pub mod heartbeat;
pub mod lifecycle;
pub mod scheduler;
pub mod submission;

pub use context::WorkerContext;
pub use engine::{EngineOutcome, EngineRunner, SubprocessEngine, USER_CANCELLED_EXIT_CODE};
pub use handlers::{ProgressReporter, TaskHandler, TaskHandlers, TaskOutcome};
pub use heartbeat::{holder_id, HeartbeatHandle, HeartbeatManager};
pub use lifecycle::{backup_file_name, ScenarioLifecycle};
pub use scheduler::{WorkerRunSummary, WorkerScheduler};
pub use submission::{InProcessWorkerLauncher, TaskSubmitter, WorkerLauncher};
