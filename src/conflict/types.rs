//! 冲突与冲突解决记录

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::CollabError;

/// 冲突类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// 多个 Worker 争用同一资源
    Resource,
    /// 优先级意见不一致
    Priority,
    /// 任务依赖顺序冲突
    Dependency,
    /// 截止时间冲突
    Timeline,
    /// 产出质量差异过大
    Quality,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::Resource => "resource",
            ConflictType::Priority => "priority",
            ConflictType::Dependency => "dependency",
            ConflictType::Timeline => "timeline",
            ConflictType::Quality => "quality",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictType {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "resource" => Ok(ConflictType::Resource),
            "priority" => Ok(ConflictType::Priority),
            "dependency" => Ok(ConflictType::Dependency),
            "timeline" => Ok(ConflictType::Timeline),
            "quality" => Ok(ConflictType::Quality),
            _ => Err(CollabError::UnknownConflictType(s.to_string())),
        }
    }
}

/// 严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// 冲突状态：detected → resolved | unresolved，只转换一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Detected,
    Resolved,
    Unresolved,
}

/// 检测到的冲突
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub conflict_type: ConflictType,
    /// 涉及的 Worker（至少两个）
    pub workers: Vec<String>,
    pub description: String,
    pub severity: Severity,
    /// 规则相关的细节（如两个质量分、争用的资源）
    pub details: Value,
    pub status: ConflictStatus,
    pub detected_at: i64,
    /// 解决记录的 ID（= 冲突 ID），解决后填入
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_id: Option<String>,
    /// 未能解决时的原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Conflict {
    pub fn new(
        conflict_type: ConflictType,
        workers: Vec<String>,
        description: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conflict_type,
            workers,
            description: description.into(),
            severity,
            details: Value::Null,
            status: ConflictStatus::Detected,
            detected_at: chrono::Utc::now().timestamp_millis(),
            resolution_id: None,
            failure_reason: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == ConflictStatus::Detected
    }

    /// 记录解决结果；已离开 detected 的冲突不再变化，返回 false
    pub fn settle(&mut self, resolution: &ConflictResolution) -> bool {
        if !self.is_open() {
            return false;
        }
        self.resolution_id = Some(resolution.conflict_id.clone());
        if resolution.success {
            self.status = ConflictStatus::Resolved;
        } else {
            self.status = ConflictStatus::Unresolved;
            self.failure_reason = Some(format!("strategy {} failed", resolution.strategy));
        }
        true
    }

    /// 标记为无法解决（如无对应策略）
    pub fn mark_unresolved(&mut self, reason: impl Into<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.status = ConflictStatus::Unresolved;
        self.failure_reason = Some(reason.into());
        true
    }
}

/// 解决动作：名称 + 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub action: String,
    pub params: Value,
}

impl ResolutionAction {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }
}

/// 冲突解决记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict_id: String,
    pub conflict_type: ConflictType,
    pub affected_workers: Vec<String>,
    pub strategy: String,
    pub actions: Vec<ResolutionAction>,
    /// 冲突检测时间（毫秒时间戳）
    pub detected_at: i64,
    pub resolved_at: i64,
    pub success: bool,
}

impl ConflictResolution {
    pub fn new(conflict: &Conflict, strategy: impl Into<String>) -> Self {
        Self {
            conflict_id: conflict.id.clone(),
            conflict_type: conflict.conflict_type,
            affected_workers: conflict.workers.clone(),
            strategy: strategy.into(),
            actions: Vec::new(),
            detected_at: conflict.detected_at,
            resolved_at: chrono::Utc::now().timestamp_millis(),
            success: true,
        }
    }

    /// 从检测到解决耗时（秒）
    pub fn resolution_secs(&self) -> f64 {
        (self.resolved_at - self.detected_at).max(0) as f64 / 1000.0
    }

    pub fn action(mut self, action: impl Into<String>, params: Value) -> Self {
        self.actions.push(ResolutionAction::new(action, params));
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality_conflict() -> Conflict {
        Conflict::new(
            ConflictType::Quality,
            vec!["planner".to_string(), "designer".to_string()],
            "quality gap",
            Severity::Medium,
        )
    }

    #[test]
    fn test_conflict_type_parse() {
        assert_eq!("Quality".parse::<ConflictType>().unwrap(), ConflictType::Quality);
        assert_eq!(
            "ethics".parse::<ConflictType>(),
            Err(CollabError::UnknownConflictType("ethics".to_string()))
        );
    }

    #[test]
    fn test_settle_only_once() {
        let mut conflict = quality_conflict();
        let resolution = ConflictResolution::new(&conflict, "standardize");
        assert!(conflict.settle(&resolution));
        assert_eq!(conflict.status, ConflictStatus::Resolved);
        assert_eq!(conflict.resolution_id.as_deref(), Some(conflict.id.as_str()));

        let failed = ConflictResolution::new(&conflict, "standardize").failed();
        assert!(!conflict.settle(&failed));
        assert!(!conflict.mark_unresolved("late"));
        assert_eq!(conflict.status, ConflictStatus::Resolved);
    }

    #[test]
    fn test_resolution_secs_from_detection() {
        let mut conflict = quality_conflict();
        conflict.detected_at -= 2_500;
        let resolution = ConflictResolution::new(&conflict, "standardize");
        assert_eq!(resolution.detected_at, conflict.detected_at);
        assert!(resolution.resolution_secs() >= 2.5);
        assert!(resolution.resolution_secs() < 60.0);
    }

    #[test]
    fn test_failed_resolution_marks_unresolved() {
        let mut conflict = quality_conflict();
        let failed = ConflictResolution::new(&conflict, "standardize").failed();
        conflict.settle(&failed);
        assert_eq!(conflict.status, ConflictStatus::Unresolved);
        assert!(conflict.failure_reason.is_some());
    }
}
