//! Worker 角色与角色配置
//!
//! 角色差异（决策权重、预估耗时、贡献描述）都放在 RoleProfile 里，引擎只做统一调用。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Worker 角色
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    /// 战略规划（最先执行）
    StrategicPlanning,
    /// 设计
    Design,
    /// 实现（最后执行）
    Implementation,
    /// 其他角色，排在三类固定角色之后
    Other(String),
}

impl WorkerRole {
    /// 顺序执行中的优先级：规划 0、设计 1、实现 2，其他角色无固定位置
    pub fn rank(&self) -> Option<u8> {
        match self {
            WorkerRole::StrategicPlanning => Some(0),
            WorkerRole::Design => Some(1),
            WorkerRole::Implementation => Some(2),
            WorkerRole::Other(_) => None,
        }
    }

    /// autonomous 计划中该角色步骤的默认动作
    pub fn default_action(&self) -> &str {
        match self {
            WorkerRole::StrategicPlanning => "strategic_analysis",
            WorkerRole::Design => "ui_design",
            WorkerRole::Implementation => "code_implementation",
            WorkerRole::Other(_) => "contribution",
        }
    }

    pub fn is_planning(&self) -> bool {
        matches!(self, WorkerRole::StrategicPlanning)
    }

    pub fn is_design(&self) -> bool {
        matches!(self, WorkerRole::Design)
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRole::StrategicPlanning => write!(f, "strategic_planning"),
            WorkerRole::Design => write!(f, "design"),
            WorkerRole::Implementation => write!(f, "implementation"),
            WorkerRole::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for WorkerRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "strategic_planning" | "planning" | "strategy" => WorkerRole::StrategicPlanning,
            "design" | "ui_design" => WorkerRole::Design,
            "implementation" | "coding" | "development" => WorkerRole::Implementation,
            other => WorkerRole::Other(other.to_string()),
        })
    }
}

/// 角色配置：决策权重（加权投票用）、预估步骤耗时（autonomous 计划用）、贡献描述（准备记录用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub role: WorkerRole,
    pub decision_weight: f64,
    pub estimated_step_secs: u64,
    pub contribution: String,
}
