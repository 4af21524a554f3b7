//! 协作类型定义
//!
//! 定义协作请求、会话、时间线、结果等核心数据类型

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collab::planner::AutonomousPlan;
use crate::conflict::{Conflict, ConflictResolution};
use crate::core::{CollabError, CollabResult};
use crate::worker::{WorkerResult, WorkerRole};

pub type SessionId = String;

/// 协作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationMode {
    /// 按角色顺序逐个执行
    Sequential,
    /// 所有参与者一批并发执行
    Parallel,
    /// 多轮并发执行，轮间交换反馈
    Interactive,
    /// 带依赖的步骤计划，运行时自适应调整
    Autonomous,
}

impl fmt::Display for CollaborationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollaborationMode::Sequential => "sequential",
            CollaborationMode::Parallel => "parallel",
            CollaborationMode::Interactive => "interactive",
            CollaborationMode::Autonomous => "autonomous",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CollaborationMode {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(CollaborationMode::Sequential),
            "parallel" => Ok(CollaborationMode::Parallel),
            "interactive" => Ok(CollaborationMode::Interactive),
            "autonomous" => Ok(CollaborationMode::Autonomous),
            _ => Err(CollabError::InvalidMode(s.to_string())),
        }
    }
}

/// 请求优先级（low < medium < high < critical）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl FromStr for Priority {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(CollabError::Validation(format!("unknown priority: {s}"))),
        }
    }
}

/// 请求需求：所需技能、质量标准、截止时间（仅作参考，不强制）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub skills: Vec<String>,
    pub quality_standard: Option<f64>,
    /// 截止时间（毫秒时间戳）
    pub deadline: Option<i64>,
}

/// 协作请求，提交后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationRequest {
    pub id: SessionId,
    pub title: String,
    pub description: String,
    pub mode: CollaborationMode,
    /// 参与的 Worker 名称（有序）
    pub participants: Vec<String>,
    pub requirements: Requirements,
    pub priority: Priority,
    pub created_at: i64,
}

impl CollaborationRequest {
    pub fn new(
        title: impl Into<String>,
        mode: CollaborationMode,
        participants: Vec<String>,
    ) -> Self {
        Self {
            id: format!("collab_{}", uuid::Uuid::new_v4()),
            title: title.into(),
            description: String::new(),
            mode,
            participants,
            requirements: Requirements::default(),
            priority: Priority::default(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// 校验必填字段：标题、参与者（非空且不重复）、质量标准范围
    pub fn validate(&self) -> CollabResult<()> {
        if self.id.trim().is_empty() {
            return Err(CollabError::Validation("id is required".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(CollabError::Validation("title is required".to_string()));
        }
        if self.participants.is_empty() {
            return Err(CollabError::Validation(
                "at least one participant is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.participants {
            if !seen.insert(name.as_str()) {
                return Err(CollabError::Validation(format!(
                    "duplicate participant: {name}"
                )));
            }
        }
        if let Some(q) = self.requirements.quality_standard {
            if !(0.0..=100.0).contains(&q) {
                return Err(CollabError::Validation(format!(
                    "quality_standard out of range: {q}"
                )));
            }
        }
        Ok(())
    }
}

/// 外部提交的请求草稿（mode / priority 为字符串，对应 HTTP 层的请求体）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationDraft {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub mode: String,
    pub participants: Vec<String>,
    pub requirements: Requirements,
    pub priority: Option<String>,
}

impl TryFrom<CollaborationDraft> for CollaborationRequest {
    type Error = CollabError;

    fn try_from(draft: CollaborationDraft) -> Result<Self, Self::Error> {
        let mode: CollaborationMode = draft.mode.parse()?;
        let priority = match draft.priority.as_deref() {
            Some(p) => p.parse()?,
            None => Priority::default(),
        };
        let mut request = CollaborationRequest::new(draft.title, mode, draft.participants)
            .with_description(draft.description)
            .with_requirements(draft.requirements)
            .with_priority(priority);
        if let Some(id) = draft.id {
            request = request.with_id(id);
        }
        Ok(request)
    }
}

/// 会话状态：active → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// 参与者准备记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preparation {
    pub role: WorkerRole,
    pub ready: bool,
    /// 能力匹配度 [0, 1]
    pub capability_match: f64,
    pub expected_contribution: String,
}

/// 时间线事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineAction {
    TaskCompleted,
    TaskFailed,
    StepSkipped,
    PlanAdapted,
}

/// 时间线条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub worker: String,
    pub action: TimelineAction,
    pub timestamp: i64,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

impl TimelineEntry {
    /// 由 Worker 结果生成：成功为 task_completed，失败为 task_failed
    pub fn from_result(result: &WorkerResult) -> Self {
        Self {
            worker: result.worker.clone(),
            action: if result.is_success() {
                TimelineAction::TaskCompleted
            } else {
                TimelineAction::TaskFailed
            },
            timestamp: chrono::Utc::now().timestamp_millis(),
            summary: result.summary(),
            round: None,
            step_id: None,
        }
    }

    pub fn new(worker: impl Into<String>, action: TimelineAction, summary: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            action,
            timestamp: chrono::Utc::now().timestamp_millis(),
            summary: summary.into(),
            round: None,
            step_id: None,
        }
    }

    pub fn in_round(mut self, round: usize) -> Self {
        self.round = Some(round);
        self
    }

    pub fn in_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

/// 合并到结果旁的冲突解决元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedResolution {
    pub conflict_id: String,
    pub strategy: String,
    pub success: bool,
}

impl From<&ConflictResolution> for AppliedResolution {
    fn from(res: &ConflictResolution) -> Self {
        Self {
            conflict_id: res.conflict_id.clone(),
            strategy: res.strategy.clone(),
            success: res.success,
        }
    }
}

/// 会话中的单个结果：引用不可变的 WorkerResult，并附带冲突解决元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub worker: String,
    pub result: Arc<WorkerResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflict_resolutions: Vec<AppliedResolution>,
}

impl ResultEntry {
    pub fn new(result: Arc<WorkerResult>) -> Self {
        Self {
            worker: result.worker.clone(),
            result,
            conflict_resolutions: Vec::new(),
        }
    }
}

/// interactive 模式每个参与者的轮末反馈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub from_worker: String,
    pub timestamp: i64,
    pub suggestions: Vec<String>,
    pub appreciations: Vec<String>,
    pub concerns: Vec<String>,
}

/// interactive 模式单轮记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: usize,
    pub entries: Vec<ResultEntry>,
    pub feedback: Vec<Feedback>,
}

/// autonomous 模式单步记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub action: String,
    pub entry: ResultEntry,
}

/// 会话结果：按执行拓扑组织
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SessionResults {
    /// sequential / parallel：参与者 → 结果（保持产出顺序）
    Flat { entries: Vec<ResultEntry> },
    /// interactive：按轮次
    Rounds { rounds: Vec<RoundRecord> },
    /// autonomous：按执行的步骤，附最终计划
    Steps {
        steps: Vec<StepRecord>,
        plan: Option<AutonomousPlan>,
    },
}

impl SessionResults {
    pub fn empty_for(mode: CollaborationMode) -> Self {
        match mode {
            CollaborationMode::Sequential | CollaborationMode::Parallel => {
                SessionResults::Flat { entries: Vec::new() }
            }
            CollaborationMode::Interactive => SessionResults::Rounds { rounds: Vec::new() },
            CollaborationMode::Autonomous => SessionResults::Steps {
                steps: Vec::new(),
                plan: None,
            },
        }
    }

    /// 所有结果条目（跨轮次 / 步骤）
    pub fn entries(&self) -> Vec<&ResultEntry> {
        match self {
            SessionResults::Flat { entries } => entries.iter().collect(),
            SessionResults::Rounds { rounds } => {
                rounds.iter().flat_map(|r| r.entries.iter()).collect()
            }
            SessionResults::Steps { steps, .. } => steps.iter().map(|s| &s.entry).collect(),
        }
    }

    /// Flat 形态下按 Worker 取结果；其他形态取该 Worker 最近一次结果
    pub fn latest_for(&self, worker: &str) -> Option<&ResultEntry> {
        self.entries().into_iter().rev().find(|e| e.worker == worker)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 协作会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub request: CollaborationRequest,
    pub status: SessionStatus,
    pub participants: BTreeMap<String, Preparation>,
    pub timeline: Vec<TimelineEntry>,
    pub conflicts: Vec<Conflict>,
    pub results: SessionResults,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub duration_secs: Option<f64>,
    /// 引擎级失败原因（status = failed 时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    pub fn new(request: CollaborationRequest, participants: BTreeMap<String, Preparation>) -> Self {
        let results = SessionResults::empty_for(request.mode);
        Self {
            id: request.id.clone(),
            request,
            status: SessionStatus::Active,
            participants,
            timeline: Vec::new(),
            conflicts: Vec::new(),
            results,
            started_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
            duration_secs: None,
            error: None,
        }
    }

    fn finish(&mut self, status: SessionStatus) {
        if self.status.is_terminal() {
            return;
        }
        let now = chrono::Utc::now().timestamp_millis();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_secs = Some((now - self.started_at).max(0) as f64 / 1000.0);
    }

    pub fn complete(&mut self) {
        self.finish(SessionStatus::Completed);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.error = Some(reason.into());
        self.finish(SessionStatus::Failed);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.request.title.clone(),
            mode: self.request.mode,
            status: self.status,
            participants: self.request.participants.clone(),
            conflicts: self.conflicts.len(),
            started_at: self.started_at,
            duration_secs: self.duration_secs,
        }
    }
}

/// 会话列表用的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub mode: CollaborationMode,
    pub status: SessionStatus,
    pub participants: Vec<String>,
    pub conflicts: usize,
    pub started_at: i64,
    pub duration_secs: Option<f64>,
}
