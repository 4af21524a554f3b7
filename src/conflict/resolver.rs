//! 冲突解决
//!
//! ConflictResolver 按冲突类型分派到 ResolutionStrategy；每条解决记录先写入 PerformanceTracker 的历史再返回。
//! 单个冲突解决失败不影响同批其他冲突。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::collab::graph::DependencyGraph;
use crate::config::CollaborationSection;
use crate::conflict::{Conflict, ConflictResolution, ConflictType};
use crate::core::{CollabError, CollabResult};
use crate::metrics::PerformanceTracker;
use crate::worker::RoleProfile;

/// 解决策略所需的会话信息
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub session_id: String,
    /// 参与者及其角色配置（按参与顺序）
    pub participants: Vec<(String, RoleProfile)>,
    /// 质量标准：请求指定或配置默认值
    pub quality_standard: f64,
    /// 截止时间（毫秒时间戳）
    pub deadline: Option<i64>,
    /// 截止时间延长比例
    pub timeline_buffer: f64,
}

impl ResolutionContext {
    pub fn new(session_id: impl Into<String>, settings: &CollaborationSection) -> Self {
        Self {
            session_id: session_id.into(),
            participants: Vec::new(),
            quality_standard: settings.default_quality_standard,
            deadline: None,
            timeline_buffer: settings.timeline_buffer,
        }
    }

    pub fn profile(&self, worker: &str) -> Option<&RoleProfile> {
        self.participants
            .iter()
            .find(|(name, _)| name == worker)
            .map(|(_, profile)| profile)
    }
}

/// 某一冲突类型的解决策略
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    /// 策略名（写入 ConflictResolution.strategy）
    fn name(&self) -> &str;

    async fn resolve(&self, conflict: &Conflict, ctx: &ResolutionContext) -> ConflictResolution;
}

/// 质量冲突：统一质量标准 + 同行评审 + 自动化质量检查
pub struct StandardizeStrategy;

#[async_trait]
impl ResolutionStrategy for StandardizeStrategy {
    fn name(&self) -> &str {
        "standardize"
    }

    async fn resolve(&self, conflict: &Conflict, ctx: &ResolutionContext) -> ConflictResolution {
        let mut reviewers: Vec<String> = ctx
            .participants
            .iter()
            .filter(|(_, profile)| profile.role.is_planning())
            .map(|(name, _)| name.clone())
            .collect();
        if reviewers.is_empty() {
            reviewers = conflict.workers.clone();
        }

        ConflictResolution::new(conflict, self.name())
            .action(
                "set_quality_standard",
                serde_json::json!({ "value": ctx.quality_standard }),
            )
            .action(
                "require_peer_review",
                serde_json::json!({ "reviewers": reviewers }),
            )
            .action(
                "implement_quality_checks",
                serde_json::json!({ "automated": true }),
            )
    }
}

/// 资源冲突：争用资源按受影响 Worker 轮转分配
pub struct RoundRobinStrategy;

#[async_trait]
impl ResolutionStrategy for RoundRobinStrategy {
    fn name(&self) -> &str {
        "round_robin_allocation"
    }

    async fn resolve(&self, conflict: &Conflict, _ctx: &ResolutionContext) -> ConflictResolution {
        let mut resolution = ConflictResolution::new(conflict, self.name());
        if conflict.workers.is_empty() {
            return resolution.failed();
        }

        let resources: Vec<&str> = conflict
            .details
            .get("resources")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        // 无可分配资源
        if resources.is_empty() {
            return resolution.failed();
        }

        for (slot, resource) in resources.iter().enumerate() {
            let worker = &conflict.workers[slot % conflict.workers.len()];
            resolution = resolution.action(
                "allocate_resource",
                serde_json::json!({ "resource": resource, "worker": worker }),
            );
        }
        resolution
    }
}

/// 优先级冲突：按角色决策权重加权投票
pub struct WeightedVoteStrategy;

#[async_trait]
impl ResolutionStrategy for WeightedVoteStrategy {
    fn name(&self) -> &str {
        "weighted_vote"
    }

    async fn resolve(&self, conflict: &Conflict, ctx: &ResolutionContext) -> ConflictResolution {
        let votes = conflict.details.get("votes").and_then(Value::as_object);

        let mut tally: BTreeMap<String, f64> = BTreeMap::new();
        for worker in &conflict.workers {
            let weight = ctx.profile(worker).map(|p| p.decision_weight).unwrap_or(0.0);
            // 未投票的 Worker 视为支持自己
            let choice = votes
                .and_then(|v| v.get(worker))
                .and_then(Value::as_str)
                .unwrap_or(worker.as_str())
                .to_string();
            *tally.entry(choice).or_insert(0.0) += weight;
        }

        let winner = tally
            .iter()
            .fold(None::<(&String, f64)>, |best, (choice, weight)| match best {
                Some((_, w)) if w >= *weight => best,
                _ => Some((choice, *weight)),
            })
            .map(|(choice, _)| choice.clone());

        let resolution = ConflictResolution::new(conflict, self.name()).action(
            "weighted_vote",
            serde_json::json!({ "tally": tally, "winner": winner }),
        );
        match winner {
            Some(_) => resolution,
            None => resolution.failed(),
        }
    }
}

/// 依赖冲突：按 details.edges 重新拓扑排序；存在环则失败
pub struct TopologicalReorderStrategy;

#[async_trait]
impl ResolutionStrategy for TopologicalReorderStrategy {
    fn name(&self) -> &str {
        "topological_reorder"
    }

    async fn resolve(&self, conflict: &Conflict, _ctx: &ResolutionContext) -> ConflictResolution {
        let mut graph = DependencyGraph::new();
        for worker in &conflict.workers {
            graph.add_node(worker);
        }
        let edges = conflict
            .details
            .get("edges")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for edge in &edges {
            let pair = edge.as_array().map(|p| {
                (
                    p.first().and_then(Value::as_str),
                    p.get(1).and_then(Value::as_str),
                )
            });
            if let Some((Some(from), Some(to))) = pair {
                graph.add_edge(from, to);
            }
        }

        let resolution = ConflictResolution::new(conflict, self.name());
        match graph.topological_order() {
            Ok(order) => resolution.action(
                "reorder_tasks",
                serde_json::json!({ "method": "topological_sort", "order": order }),
            ),
            Err(e) => resolution
                .action(
                    "reorder_tasks",
                    serde_json::json!({ "method": "topological_sort", "error": e.to_string() }),
                )
                .failed(),
        }
    }
}

/// 时间冲突：截止时间按剩余时间（无截止时间时按预估耗时）加缓冲
pub struct DeadlineExtensionStrategy;

#[async_trait]
impl ResolutionStrategy for DeadlineExtensionStrategy {
    fn name(&self) -> &str {
        "deadline_extension"
    }

    async fn resolve(&self, conflict: &Conflict, ctx: &ResolutionContext) -> ConflictResolution {
        let now = chrono::Utc::now().timestamp_millis();
        let buffer = ctx.timeline_buffer;

        let new_deadline = match ctx.deadline {
            Some(deadline) => {
                let remaining = (deadline - now).max(0) as f64;
                Some(deadline + (remaining * buffer).round() as i64)
            }
            None => conflict
                .details
                .get("estimated_secs")
                .and_then(Value::as_f64)
                .map(|secs| now + (secs * 1000.0 * (1.0 + buffer)).round() as i64),
        };

        let resolution = ConflictResolution::new(conflict, self.name());
        match new_deadline {
            Some(new_deadline) => resolution.action(
                "extend_deadline",
                serde_json::json!({ "buffer": buffer, "new_deadline": new_deadline }),
            ),
            // 既无截止时间也无预估耗时，无从延长
            None => resolution.failed(),
        }
    }
}

/// 冲突解决器：类型 → 策略的分派表
pub struct ConflictResolver {
    strategies: HashMap<ConflictType, Arc<dyn ResolutionStrategy>>,
    tracker: Arc<PerformanceTracker>,
}

impl ConflictResolver {
    /// 五种冲突类型的默认策略
    pub fn new(tracker: Arc<PerformanceTracker>) -> Self {
        Self::empty(tracker)
            .with_strategy(ConflictType::Quality, StandardizeStrategy)
            .with_strategy(ConflictType::Resource, RoundRobinStrategy)
            .with_strategy(ConflictType::Priority, WeightedVoteStrategy)
            .with_strategy(ConflictType::Dependency, TopologicalReorderStrategy)
            .with_strategy(ConflictType::Timeline, DeadlineExtensionStrategy)
    }

    pub fn empty(tracker: Arc<PerformanceTracker>) -> Self {
        Self {
            strategies: HashMap::new(),
            tracker,
        }
    }

    pub fn with_strategy(
        mut self,
        conflict_type: ConflictType,
        strategy: impl ResolutionStrategy + 'static,
    ) -> Self {
        self.strategies.insert(conflict_type, Arc::new(strategy));
        self
    }

    /// 解决单个冲突并写入历史；无对应策略时冲突标记为 unresolved 并返回 UnknownConflictType
    pub async fn resolve(
        &self,
        conflict: &mut Conflict,
        ctx: &ResolutionContext,
    ) -> CollabResult<ConflictResolution> {
        let Some(strategy) = self.strategies.get(&conflict.conflict_type) else {
            conflict.mark_unresolved(format!("no strategy for {}", conflict.conflict_type));
            return Err(CollabError::UnknownConflictType(
                conflict.conflict_type.to_string(),
            ));
        };

        let resolution = strategy.resolve(conflict, ctx).await;
        conflict.settle(&resolution);
        self.tracker.record_resolution(resolution.clone()).await;

        if resolution.success {
            tracing::info!(
                session = %ctx.session_id,
                conflict = %conflict.id,
                strategy = %resolution.strategy,
                "conflict resolved"
            );
        } else {
            tracing::warn!(
                session = %ctx.session_id,
                conflict = %conflict.id,
                strategy = %resolution.strategy,
                "conflict unresolved"
            );
        }
        Ok(resolution)
    }

    /// 逐个解决；单个失败只记录日志
    pub async fn resolve_all(
        &self,
        conflicts: &mut [Conflict],
        ctx: &ResolutionContext,
    ) -> Vec<ConflictResolution> {
        let mut resolutions = Vec::with_capacity(conflicts.len());
        for conflict in conflicts.iter_mut() {
            match self.resolve(conflict, ctx).await {
                Ok(resolution) => resolutions.push(resolution),
                Err(e) => {
                    tracing::warn!(session = %ctx.session_id, conflict = %conflict.id, error = %e, "conflict resolution failed");
                }
            }
        }
        resolutions
    }
}
