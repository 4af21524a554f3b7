//! 协作层：请求与会话类型、执行规划、依赖图、协作引擎

pub mod engine;
pub mod feedback;
pub mod graph;
pub mod planner;
pub mod types;

pub use engine::CollaborationEngine;
pub use graph::DependencyGraph;
pub use planner::{AutonomousPlan, ExecutionPlan, ExecutionPlanner, PlanStep};
pub use types::{
    AppliedResolution, CollaborationDraft, CollaborationMode, CollaborationRequest, Feedback,
    Preparation, Priority, Requirements, ResultEntry, RoundRecord, Session, SessionId,
    SessionResults, SessionStatus, SessionSummary, StepRecord, TimelineAction, TimelineEntry,
};
