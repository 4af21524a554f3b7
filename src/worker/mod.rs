//! Worker 层：能力接口、注册表、能力匹配、角色配置
//!
//! 引擎只通过 Worker trait 调用能力提供方，不关心其内部如何计算结果。

pub mod matcher;
pub mod registry;
pub mod role;
pub mod scripted;
pub mod types;

pub use matcher::match_capabilities;
pub use registry::{Worker, WorkerRegistry, WorkerStatus};
pub use role::{RoleProfile, WorkerRole};
pub use scripted::ScriptedWorker;
pub use types::{PeerBoard, ResultStatus, WorkerContext, WorkerOutput, WorkerResult};
