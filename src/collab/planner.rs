//! 执行规划器
//!
//! 根据协作模式与参与者生成执行计划：
//! - sequential：规划 → 设计 → 实现，同角色按注册顺序，其他角色按参与顺序追加
//! - parallel：所有参与者一批并发
//! - interactive：固定轮数，每轮所有参与者并发
//! - autonomous：带依赖与预估耗时的步骤列表，运行时可追加自适应步骤

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collab::graph::DependencyGraph;
use crate::collab::types::{CollaborationMode, CollaborationRequest};
use crate::config::{CollaborationSection, RolesSection};
use crate::core::CollabResult;
use crate::worker::{Worker, WorkerRegistry, WorkerRole};

/// 自适应步骤的预估耗时（秒）
const ADAPTIVE_STEP_SECS: u64 = 30;

/// autonomous 计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub worker: String,
    pub action: String,
    pub dependencies: Vec<String>,
    pub estimated_secs: u64,
    /// 是否为运行时追加的步骤
    #[serde(default)]
    pub adaptive: bool,
}

/// autonomous 计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomousPlan {
    pub id: String,
    pub session_id: String,
    pub steps: Vec<PlanStep>,
    /// 自适应步骤优先交给的 Worker（首个设计角色参与者）
    pub adaptive_worker: Option<String>,
    pub adaptations: usize,
    pub max_adaptations: usize,
}

impl AutonomousPlan {
    pub fn total_estimated_secs(&self) -> u64 {
        self.steps.iter().map(|s| s.estimated_secs).sum()
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// 根据触发步骤追加一个额外设计步骤，依赖于触发步骤；超过上限时返回 None
    pub fn adapt(&mut self, trigger_step_id: &str) -> Option<PlanStep> {
        if self.adaptations >= self.max_adaptations {
            return None;
        }
        let trigger = self.step(trigger_step_id)?;
        let worker = self
            .adaptive_worker
            .clone()
            .unwrap_or_else(|| trigger.worker.clone());

        let step = PlanStep {
            id: format!("adaptive_step_{}", self.steps.len() + 1),
            worker,
            action: "additional_design".to_string(),
            dependencies: vec![trigger_step_id.to_string()],
            estimated_secs: ADAPTIVE_STEP_SECS,
            adaptive: true,
        };
        self.steps.push(step.clone());
        self.adaptations += 1;
        Some(step)
    }

    /// 依赖图校验：依赖必须指向已存在的步骤，且无环
    pub fn validate(&self) -> CollabResult<()> {
        for step in &self.steps {
            for dep in &step.dependencies {
                if self.step(dep).is_none() {
                    return Err(crate::core::CollabError::Validation(format!(
                        "step {} depends on unknown step {}",
                        step.id, dep
                    )));
                }
            }
        }
        self.graph().topological_order().map(|_| ())
    }

    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::from_dependencies(
            self.steps
                .iter()
                .map(|s| (s.id.as_str(), s.dependencies.as_slice())),
        )
    }
}

/// 执行计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ExecutionPlan {
    Sequential { order: Vec<String> },
    Parallel { batch: Vec<String> },
    Interactive { rounds: usize, participants: Vec<String> },
    Autonomous(AutonomousPlan),
}

impl ExecutionPlan {
    pub fn mode(&self) -> CollaborationMode {
        match self {
            ExecutionPlan::Sequential { .. } => CollaborationMode::Sequential,
            ExecutionPlan::Parallel { .. } => CollaborationMode::Parallel,
            ExecutionPlan::Interactive { .. } => CollaborationMode::Interactive,
            ExecutionPlan::Autonomous(_) => CollaborationMode::Autonomous,
        }
    }
}

/// 执行规划器
#[derive(Debug, Clone)]
pub struct ExecutionPlanner {
    rounds: usize,
    max_adaptations: usize,
    roles: RolesSection,
}

impl Default for ExecutionPlanner {
    fn default() -> Self {
        Self::new(&CollaborationSection::default(), RolesSection::default())
    }
}

impl ExecutionPlanner {
    pub fn new(collab: &CollaborationSection, roles: RolesSection) -> Self {
        Self {
            rounds: collab.interactive_rounds.max(1),
            max_adaptations: collab.max_adaptations,
            roles,
        }
    }

    /// 生成执行计划；参与者未注册时返回 UnknownWorker，规划中止
    pub fn plan(
        &self,
        request: &CollaborationRequest,
        registry: &WorkerRegistry,
    ) -> CollabResult<ExecutionPlan> {
        let workers = registry.resolve(&request.participants)?;

        let plan = match request.mode {
            CollaborationMode::Sequential => ExecutionPlan::Sequential {
                order: sequential_order(&workers, registry),
            },
            CollaborationMode::Parallel => ExecutionPlan::Parallel {
                batch: request.participants.clone(),
            },
            CollaborationMode::Interactive => ExecutionPlan::Interactive {
                rounds: self.rounds,
                participants: request.participants.clone(),
            },
            CollaborationMode::Autonomous => {
                let plan = self.autonomous_plan(&request.id, &workers);
                plan.validate()?;
                ExecutionPlan::Autonomous(plan)
            }
        };

        tracing::debug!(session = %request.id, mode = %request.mode, "plan generated");
        Ok(plan)
    }

    /// 按角色分层生成步骤：每个步骤依赖所有更早层级的步骤
    fn autonomous_plan(&self, session_id: &str, workers: &[Arc<dyn Worker>]) -> AutonomousPlan {
        let tier_of = |role: &WorkerRole| role.rank().unwrap_or(3);

        let mut ordered: Vec<&Arc<dyn Worker>> = workers.iter().collect();
        ordered.sort_by_key(|w| tier_of(&w.role()));

        let mut steps: Vec<PlanStep> = Vec::with_capacity(ordered.len());
        for (idx, worker) in ordered.iter().enumerate() {
            let role = worker.role();
            let tier = tier_of(&role);
            let dependencies = steps
                .iter()
                .zip(ordered.iter())
                .filter(|(_, w)| tier_of(&w.role()) < tier)
                .map(|(s, _)| s.id.clone())
                .collect();
            let profile = self.roles.profile_for(&role);
            steps.push(PlanStep {
                id: format!("step_{}", idx + 1),
                worker: worker.name().to_string(),
                action: role.default_action().to_string(),
                dependencies,
                estimated_secs: profile.estimated_step_secs,
                adaptive: false,
            });
        }

        let adaptive_worker = ordered
            .iter()
            .find(|w| w.role().is_design())
            .map(|w| w.name().to_string());

        AutonomousPlan {
            id: format!("plan_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")),
            session_id: session_id.to_string(),
            steps,
            adaptive_worker,
            adaptations: 0,
            max_adaptations: self.max_adaptations,
        }
    }
}

/// 顺序模式的执行顺序：规划 → 设计 → 实现（同角色按注册顺序），其余角色按参与顺序追加
pub fn sequential_order(workers: &[Arc<dyn Worker>], registry: &WorkerRegistry) -> Vec<String> {
    let mut ranked: Vec<(u8, usize, String)> = Vec::new();
    let mut rest: Vec<String> = Vec::new();

    for worker in workers {
        let name = worker.name().to_string();
        match worker.role().rank() {
            Some(rank) => {
                let reg = registry.registration_index(&name).unwrap_or(usize::MAX);
                ranked.push((rank, reg, name));
            }
            None => rest.push(name),
        }
    }

    ranked.sort_by_key(|(rank, reg, _)| (*rank, *reg));
    ranked
        .into_iter()
        .map(|(_, _, name)| name)
        .chain(rest)
        .collect()
}
