//! Hive - 多 Worker 协作核心
//!
//! 模块划分：
//! - **worker**: Worker trait、注册表、能力匹配、角色配置、脚本化 Worker
//! - **collab**: 协作请求与会话、执行规划（四种模式）、依赖图、协作引擎
//! - **conflict**: 冲突检测规则与按类型分派的解决策略
//! - **metrics**: 会话指标与冲突解决历史
//! - **service**: 对外接口（提交、查询、等待、单任务分配、报告）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **observability**: 日志初始化

pub mod collab;
pub mod config;
pub mod conflict;
pub mod core;
pub mod metrics;
pub mod observability;
pub mod service;
pub mod worker;

pub use collab::{
    CollaborationDraft, CollaborationEngine, CollaborationMode, CollaborationRequest, Session,
    SessionStatus,
};
pub use config::{load_config, AppConfig};
pub use core::{CollabError, CollabResult};
pub use metrics::PerformanceTracker;
pub use service::{CollaborationService, TaskAssignment, TaskReceipt};
pub use worker::{Worker, WorkerRegistry, WorkerRole};
