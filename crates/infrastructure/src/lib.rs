pub mod database;
pub mod observability;
pub mod password;
pub mod process;

pub use database::*;
pub use observability::{init_metrics, MetricsCollector};
pub use password::{hash_password, hash_password_with_cost, verify_password};
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};
