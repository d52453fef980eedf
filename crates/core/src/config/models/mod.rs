pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod lifecycle;
pub mod worker;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::{AppConfig, DEFAULT_SCENARIO_NAME};
pub use database::{ConnectionParams, DatabaseEngine, DatabasePoolConfig, ScenarioDescriptor};
pub use lifecycle::{EngineConfig, LifecycleConfig, MaintenanceConfig};
pub use worker::WorkerConfig;
