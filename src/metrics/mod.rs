//! 性能指标与冲突解决历史
//!
//! 每个进程一个 PerformanceTracker，由服务持有并以 Arc 共享；所有写入经 RwLock 串行化。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::collab::types::{Session, SessionStatus};
use crate::conflict::ConflictResolution;

/// 聚合指标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_sessions: u64,
    pub successful_sessions: u64,
    /// 成功解决的冲突数
    pub conflicts_resolved: u64,
    /// 已完成会话的平均耗时（秒）
    pub average_duration_secs: f64,
    /// Worker → 参与的会话数
    pub worker_utilization: BTreeMap<String, u64>,
}

/// 冲突解决报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub history: Vec<ConflictResolution>,
    pub total_conflicts: usize,
    pub successful_resolutions: usize,
    /// 成功率（百分比），无历史时为 100
    pub resolution_rate: f64,
    /// 从检测到解决的平均耗时（秒），无历史时为 0
    pub average_resolution_secs: f64,
}

#[derive(Debug, Default)]
pub struct PerformanceTracker {
    metrics: RwLock<PerformanceMetrics>,
    history: RwLock<Vec<ConflictResolution>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个已结束的会话；只有 completed 会话计入成功数与平均耗时
    pub async fn record(&self, session: &Session) {
        let mut metrics = self.metrics.write().await;
        metrics.total_sessions += 1;

        if session.status == SessionStatus::Completed {
            metrics.successful_sessions += 1;
            let n = metrics.successful_sessions as f64;
            let duration = session.duration_secs.unwrap_or(0.0);
            metrics.average_duration_secs =
                (metrics.average_duration_secs * (n - 1.0) + duration) / n;
        }

        for worker in &session.request.participants {
            *metrics.worker_utilization.entry(worker.clone()).or_insert(0) += 1;
        }

        tracing::debug!(
            session = %session.id,
            total = metrics.total_sessions,
            successful = metrics.successful_sessions,
            "session recorded"
        );
    }

    pub async fn record_resolution(&self, resolution: ConflictResolution) {
        if resolution.success {
            self.metrics.write().await.conflicts_resolved += 1;
        }
        self.history.write().await.push(resolution);
    }

    pub async fn resolution_rate(&self) -> f64 {
        let history = self.history.read().await;
        rate(&history)
    }

    pub async fn snapshot(&self) -> PerformanceMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn conflict_report(&self) -> ConflictReport {
        let history = self.history.read().await.clone();
        let successful_resolutions = history.iter().filter(|r| r.success).count();
        ConflictReport {
            total_conflicts: history.len(),
            successful_resolutions,
            resolution_rate: rate(&history),
            average_resolution_secs: average_resolution_secs(&history),
            history,
        }
    }
}

fn rate(history: &[ConflictResolution]) -> f64 {
    if history.is_empty() {
        return 100.0;
    }
    let ok = history.iter().filter(|r| r.success).count();
    100.0 * ok as f64 / history.len() as f64
}

fn average_resolution_secs(history: &[ConflictResolution]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let total: f64 = history.iter().map(ConflictResolution::resolution_secs).sum();
    total / history.len() as f64
}
