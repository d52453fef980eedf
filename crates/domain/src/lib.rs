//! 场景调度领域层
//!
//! 实体、值对象、仓储抽象与场景注册表端口。不依赖任何具体存储实现。

pub mod entities;
pub mod registry;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use registry::ScenarioRegistry;
pub use repositories::*;
pub use services::{ScenarioService, SyncReport};
pub use value_objects::*;
