//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__COLLABORATION__INTERACTIVE_ROUNDS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::worker::{RoleProfile, WorkerRole};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub collaboration: CollaborationSection,
    #[serde(default)]
    pub roles: RolesSection,
    /// 本地运行时注册的脚本化 Worker（[[workers]]）
    #[serde(default)]
    pub workers: Vec<WorkerSection>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [collaboration] 段：交互轮数、质量差阈值、截止时间缓冲等
#[derive(Debug, Clone, Deserialize)]
pub struct CollaborationSection {
    /// interactive 模式的轮数
    #[serde(default = "default_interactive_rounds")]
    pub interactive_rounds: usize,
    /// 两个结果的 quality_score 差超过该值即视为质量冲突
    #[serde(default = "default_quality_gap_threshold")]
    pub quality_gap_threshold: f64,
    /// 请求未指定质量标准时使用的最低质量线
    #[serde(default = "default_quality_standard")]
    pub default_quality_standard: f64,
    /// 截止时间延长比例（0.2 = 20%）
    #[serde(default = "default_timeline_buffer")]
    pub timeline_buffer: f64,
    /// autonomous 模式单个会话最多追加的自适应步骤数
    #[serde(default = "default_max_adaptations")]
    pub max_adaptations: usize,
}

fn default_interactive_rounds() -> usize {
    3
}

fn default_quality_gap_threshold() -> f64 {
    20.0
}

fn default_quality_standard() -> f64 {
    90.0
}

fn default_timeline_buffer() -> f64 {
    0.2
}

fn default_max_adaptations() -> usize {
    3
}

impl Default for CollaborationSection {
    fn default() -> Self {
        Self {
            interactive_rounds: default_interactive_rounds(),
            quality_gap_threshold: default_quality_gap_threshold(),
            default_quality_standard: default_quality_standard(),
            timeline_buffer: default_timeline_buffer(),
            max_adaptations: default_max_adaptations(),
        }
    }
}

/// [roles.*] 段：每个角色的决策权重、预估步骤耗时、贡献描述
#[derive(Debug, Clone, Deserialize)]
pub struct RolesSection {
    #[serde(default = "default_planning_role")]
    pub planning: RoleSection,
    #[serde(default = "default_design_role")]
    pub design: RoleSection,
    #[serde(default = "default_implementation_role")]
    pub implementation: RoleSection,
    #[serde(default = "default_other_role")]
    pub other: RoleSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleSection {
    pub decision_weight: f64,
    pub estimated_step_secs: u64,
    pub contribution: String,
}

fn default_planning_role() -> RoleSection {
    RoleSection {
        decision_weight: 0.4,
        estimated_step_secs: 30,
        contribution: "strategy, documentation, quality management".to_string(),
    }
}

fn default_design_role() -> RoleSection {
    RoleSection {
        decision_weight: 0.25,
        estimated_step_secs: 45,
        contribution: "ui design, prototyping, usability".to_string(),
    }
}

fn default_implementation_role() -> RoleSection {
    RoleSection {
        decision_weight: 0.35,
        estimated_step_secs: 60,
        contribution: "code, optimization, testing".to_string(),
    }
}

fn default_other_role() -> RoleSection {
    RoleSection {
        decision_weight: 0.1,
        estimated_step_secs: 30,
        contribution: "general contribution".to_string(),
    }
}

impl Default for RolesSection {
    fn default() -> Self {
        Self {
            planning: default_planning_role(),
            design: default_design_role(),
            implementation: default_implementation_role(),
            other: default_other_role(),
        }
    }
}

impl RolesSection {
    /// 将角色配置转为 RoleProfile（引擎与解决策略只依赖 RoleProfile，不按名字分支）
    pub fn profile_for(&self, role: &WorkerRole) -> RoleProfile {
        let section = match role {
            WorkerRole::StrategicPlanning => &self.planning,
            WorkerRole::Design => &self.design,
            WorkerRole::Implementation => &self.implementation,
            WorkerRole::Other(_) => &self.other,
        };
        RoleProfile {
            role: role.clone(),
            decision_weight: section.decision_weight,
            estimated_step_secs: section.estimated_step_secs,
            contribution: section.contribution.clone(),
        }
    }
}

/// [[workers]] 段：脚本化 Worker 定义（本地运行 / 演示用）
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// 结果类型标签，缺省为角色对应的默认值
    pub kind: Option<String>,
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub requires_adaptation: bool,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
