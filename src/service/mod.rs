//! 协作服务：对外接口
//!
//! - 会话：submit / submit_draft / get_session / list_sessions / wait_for
//! - 单任务分配：assign_task / complete_task
//! - 报告：metrics / conflicts / system_status
//!
//! submit 在校验与规划通过后立即返回会话 ID，会话在 tokio 任务中执行。

pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collab::types::{
    CollaborationDraft, CollaborationRequest, Priority, Session, SessionId, SessionSummary,
};
use crate::collab::CollaborationEngine;
use crate::config::AppConfig;
use crate::core::{CollabError, CollabResult};
use crate::metrics::{ConflictReport, PerformanceMetrics, PerformanceTracker};
use crate::worker::{ScriptedWorker, WorkerRegistry, WorkerStatus};

pub use store::SessionStore;

/// 分配给单个 Worker 的任务
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskAssignment {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub metadata: serde_json::Value,
}

/// 任务分配回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub task_id: String,
    pub worker: String,
    pub status: String,
    /// 在 Worker 在途队列中的位置（从 1 开始）
    pub queue_position: usize,
    pub priority: Priority,
    pub assigned_at: i64,
}

/// 冲突概况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub total_conflicts: usize,
    pub successful_resolutions: usize,
    pub resolution_rate: f64,
    /// 从检测到解决的平均耗时（秒）
    pub average_resolution_secs: f64,
}

/// 系统状态
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub workers: Vec<WorkerStatus>,
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub metrics: PerformanceMetrics,
    pub conflicts: ConflictSummary,
    pub timestamp: i64,
}

/// 协作服务
pub struct CollaborationService {
    engine: Arc<CollaborationEngine>,
    store: Arc<SessionStore>,
}

impl CollaborationService {
    pub fn new(engine: CollaborationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            store: Arc::new(SessionStore::new()),
        }
    }

    /// 按配置注册脚本化 Worker（未配置时使用默认三角色组合）并创建服务
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = WorkerRegistry::new();
        if config.workers.is_empty() {
            for worker in ScriptedWorker::default_team() {
                registry.register(worker);
            }
        } else {
            for section in &config.workers {
                registry.register(ScriptedWorker::from_config(section));
            }
        }
        tracing::info!(workers = registry.names().len(), "worker registry ready");

        let tracker = Arc::new(PerformanceTracker::new());
        Self::new(CollaborationEngine::new(Arc::new(registry), tracker, config))
    }

    pub fn engine(&self) -> &Arc<CollaborationEngine> {
        &self.engine
    }

    /// 提交协作请求：校验、规划、登记会话后立即返回；执行在后台进行
    pub async fn submit(&self, request: CollaborationRequest) -> CollabResult<SessionId> {
        let (session, plan) = match self.engine.prepare(request) {
            Ok(prepared) => prepared,
            Err(e) if e.is_rejection() => {
                tracing::warn!(error = %e, "collaboration request rejected");
                return Err(e);
            }
            Err(e) => {
                tracing::error!(error = %e, "collaboration planning failed");
                return Err(e);
            }
        };
        let id = session.id.clone();
        let tx = self.store.insert(session.clone()).await?;

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            engine.run(session, plan, Some(tx)).await;
        });

        tracing::info!(session = %id, "collaboration started");
        Ok(id)
    }

    pub async fn submit_draft(&self, draft: CollaborationDraft) -> CollabResult<SessionId> {
        let request = CollaborationRequest::try_from(draft)?;
        self.submit(request).await
    }

    pub async fn get_session(&self, id: &str) -> CollabResult<Session> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| CollabError::NotFound(format!("session {id}")))
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.store.list().await
    }

    /// 等待会话进入终态并返回最终会话
    pub async fn wait_for(&self, id: &str) -> CollabResult<Session> {
        let mut rx = self
            .store
            .receiver(id)
            .await
            .ok_or_else(|| CollabError::NotFound(format!("session {id}")))?;
        loop {
            {
                let session = rx.borrow_and_update();
                if session.status.is_terminal() {
                    return Ok(session.clone());
                }
            }
            if rx.changed().await.is_err() {
                // 执行任务已结束但未发布终态
                return Ok(rx.borrow().clone());
            }
        }
    }

    /// 分配单个任务给指定 Worker
    pub async fn assign_task(&self, worker: &str, task: TaskAssignment) -> CollabResult<TaskReceipt> {
        if task.title.trim().is_empty() || task.description.trim().is_empty() {
            return Err(CollabError::Validation(
                "task title and description are required".to_string(),
            ));
        }
        let registry = self.engine.registry();
        if !registry.contains(worker) {
            return Err(CollabError::NotFound(format!("worker {worker}")));
        }

        let task_id = format!("task_{}", uuid::Uuid::new_v4());
        let queue_position = registry.enqueue_task(worker, &task_id).await?;
        tracing::info!(worker = %worker, task = %task_id, title = %task.title, "task assigned");

        Ok(TaskReceipt {
            task_id,
            worker: worker.to_string(),
            status: "assigned".to_string(),
            queue_position,
            priority: task.priority,
            assigned_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub async fn complete_task(&self, worker: &str, task_id: &str) -> CollabResult<bool> {
        self.engine.registry().complete_task(worker, task_id).await
    }

    pub async fn metrics(&self) -> PerformanceMetrics {
        self.engine.tracker().snapshot().await
    }

    pub async fn conflicts(&self) -> ConflictReport {
        self.engine.tracker().conflict_report().await
    }

    pub async fn system_status(&self) -> SystemStatus {
        let report = self.conflicts().await;
        SystemStatus {
            workers: self.engine.registry().status().await,
            active_sessions: self.store.active_count().await,
            total_sessions: self.store.len().await,
            metrics: self.metrics().await,
            conflicts: ConflictSummary {
                total_conflicts: report.total_conflicts,
                successful_resolutions: report.successful_resolutions,
                resolution_rate: report.resolution_rate,
                average_resolution_secs: report.average_resolution_secs,
            },
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::types::{CollaborationMode, SessionStatus};

    fn service() -> CollaborationService {
        CollaborationService::from_config(&AppConfig::default())
    }

    fn team_request() -> CollaborationRequest {
        CollaborationRequest::new(
            "Platform",
            CollaborationMode::Sequential,
            vec!["coder".to_string(), "planner".to_string(), "designer".to_string()],
        )
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let service = service();
        let id = service.submit(team_request()).await.unwrap();
        let session = service.wait_for(&id).await.unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.results.len(), 3);
        assert_eq!(service.list_sessions().await.len(), 1);
        assert_eq!(service.metrics().await.total_sessions, 1);
        assert_eq!(service.get_session(&id).await.unwrap().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_session_id_rejected() {
        let service = service();
        let request = team_request().with_id("collab_fixed");
        service.submit(request.clone()).await.unwrap();
        assert!(matches!(
            service.submit(request).await,
            Err(CollabError::Validation(_))
        ));
        assert_eq!(service.list_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_draft_invalid_mode() {
        let service = service();
        let draft = CollaborationDraft {
            title: "x".to_string(),
            mode: "swarm".to_string(),
            participants: vec!["planner".to_string()],
            ..CollaborationDraft::default()
        };
        assert_eq!(
            service.submit_draft(draft).await,
            Err(CollabError::InvalidMode("swarm".to_string()))
        );
    }

    #[tokio::test]
    async fn test_task_assignment() {
        let service = service();
        let task = TaskAssignment {
            title: "Review API".to_string(),
            description: "Check the endpoints".to_string(),
            ..TaskAssignment::default()
        };

        let receipt = service.assign_task("planner", task.clone()).await.unwrap();
        assert_eq!(receipt.status, "assigned");
        assert_eq!(receipt.queue_position, 1);
        assert!(receipt.task_id.starts_with("task_"));

        assert!(matches!(
            service.assign_task("ghost", task).await,
            Err(CollabError::NotFound(_))
        ));
        assert!(matches!(
            service.assign_task("planner", TaskAssignment::default()).await,
            Err(CollabError::Validation(_))
        ));

        assert!(service.complete_task("planner", &receipt.task_id).await.unwrap());
        let status = service.system_status().await;
        assert_eq!(status.conflicts.resolution_rate, 100.0);
        assert_eq!(status.conflicts.average_resolution_secs, 0.0);
        assert_eq!(status.workers.len(), 3);
        assert!(status.workers.iter().all(|w| w.active_tasks == 0));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let service = service();
        assert!(matches!(
            service.get_session("nope").await,
            Err(CollabError::NotFound(_))
        ));
        assert!(service.wait_for("nope").await.is_err());
    }
}
