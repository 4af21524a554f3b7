//! 冲突检测
//!
//! 检测由一组 ConflictRule 组成，对结果两两比较；新增冲突类型只需实现 ConflictRule 并 with_rule 注册。

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::conflict::{Conflict, ConflictType, Severity};
use crate::worker::WorkerResult;

/// 检测规则：比较两个结果，可能产出一个冲突
pub trait ConflictRule: Send + Sync {
    fn conflict_type(&self) -> ConflictType;

    fn check(&self, a: &WorkerResult, b: &WorkerResult) -> Option<Conflict>;
}

/// 质量差规则：两个结果都带数值 quality_score 且差值超过阈值
#[derive(Debug, Clone)]
pub struct QualityGapRule {
    pub threshold: f64,
}

impl QualityGapRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl ConflictRule for QualityGapRule {
    fn conflict_type(&self) -> ConflictType {
        ConflictType::Quality
    }

    fn check(&self, a: &WorkerResult, b: &WorkerResult) -> Option<Conflict> {
        let (qa, qb) = (a.quality_score()?, b.quality_score()?);
        let gap = (qa - qb).abs();
        if gap <= self.threshold {
            return None;
        }
        Some(
            Conflict::new(
                ConflictType::Quality,
                vec![a.worker.clone(), b.worker.clone()],
                format!(
                    "Quality difference of {:.1} between {} and {}",
                    gap, a.worker, b.worker
                ),
                Severity::Medium,
            )
            .with_details(serde_json::json!({
                "scores": [
                    { "worker": a.worker, "quality_score": qa },
                    { "worker": b.worker, "quality_score": qb },
                ],
                "gap": gap,
                "threshold": self.threshold,
            })),
        )
    }
}

/// 资源争用规则：两个结果的 claimed_resources 有交集
#[derive(Debug, Clone, Default)]
pub struct ResourceClaimRule;

fn claimed_resources(result: &WorkerResult) -> BTreeSet<String> {
    result
        .payload
        .get("claimed_resources")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl ConflictRule for ResourceClaimRule {
    fn conflict_type(&self) -> ConflictType {
        ConflictType::Resource
    }

    fn check(&self, a: &WorkerResult, b: &WorkerResult) -> Option<Conflict> {
        let claims_b = claimed_resources(b);
        let contested: Vec<String> = claimed_resources(a)
            .into_iter()
            .filter(|r| claims_b.contains(r))
            .collect();
        if contested.is_empty() {
            return None;
        }
        Some(
            Conflict::new(
                ConflictType::Resource,
                vec![a.worker.clone(), b.worker.clone()],
                format!("{} and {} claim {}", a.worker, b.worker, contested.join(", ")),
                Severity::High,
            )
            .with_details(serde_json::json!({ "resources": contested })),
        )
    }
}

/// 冲突检测器
pub struct ConflictDetector {
    rules: Vec<Arc<dyn ConflictRule>>,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(20.0)
    }
}

impl ConflictDetector {
    /// 默认规则集：质量差 + 资源争用
    pub fn new(quality_gap_threshold: f64) -> Self {
        Self::empty()
            .with_rule(QualityGapRule::new(quality_gap_threshold))
            .with_rule(ResourceClaimRule)
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: impl ConflictRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn rule_types(&self) -> Vec<ConflictType> {
        self.rules.iter().map(|r| r.conflict_type()).collect()
    }

    /// 对一对结果运行所有规则；同一 Worker 的结果之间不比较
    pub fn detect(&self, a: &WorkerResult, b: &WorkerResult) -> Vec<Conflict> {
        if a.worker == b.worker {
            return Vec::new();
        }
        self.rules.iter().filter_map(|rule| rule.check(a, b)).collect()
    }

    /// 一批结果的所有无序对（parallel / interactive）
    pub fn detect_all(&self, results: &[Arc<WorkerResult>]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (i, a) in results.iter().enumerate() {
            for b in &results[i + 1..] {
                conflicts.extend(self.detect(a, b));
            }
        }
        if !conflicts.is_empty() {
            tracing::debug!(count = conflicts.len(), "conflicts detected in batch");
        }
        conflicts
    }

    /// 新结果与此前每个结果比较（sequential / autonomous）
    pub fn detect_against(
        &self,
        new: &WorkerResult,
        earlier: &[Arc<WorkerResult>],
    ) -> Vec<Conflict> {
        let conflicts: Vec<Conflict> = earlier
            .iter()
            .flat_map(|prev| self.detect(prev, new))
            .collect();
        if !conflicts.is_empty() {
            tracing::debug!(worker = %new.worker, count = conflicts.len(), "conflicts detected");
        }
        conflicts
    }
}
