//! Worker 注册表
//!
//! 所有 Worker 实现 Worker trait（name / role / capabilities / execute），由 WorkerRegistry 按名注册与查找；
//! execute 统一把失败转为 CollabError::WorkerExecution，每次调用输出结构化审计日志（JSON），
//! 并维护调用计数与每个 Worker 的在途任务队列。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::{CollabError, CollabResult};
use crate::worker::{WorkerContext, WorkerOutput, WorkerResult, WorkerRole};

/// Worker trait：名称、角色、能力标签（有序）、异步执行
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker 名称（会话 participants 中引用的名字）
    fn name(&self) -> &str;

    fn role(&self) -> WorkerRole;

    /// 能力标签，供 Capability Matcher 与需求技能匹配
    fn capabilities(&self) -> &[String];

    /// 执行一次任务；Err 中的字符串作为失败结果的错误信息
    async fn execute(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String>;
}

struct WorkerEntry {
    worker: Arc<dyn Worker>,
    /// 在途任务 ID 队列
    active_tasks: RwLock<Vec<String>>,
    invocations: AtomicU64,
}

/// 注册表中单个 Worker 的状态快照
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub role: WorkerRole,
    pub capabilities: Vec<String>,
    pub active_tasks: usize,
    pub invocations: u64,
}

/// Worker 注册表：按名称存储 Arc<dyn Worker>，保留注册顺序（顺序模式同级排序依据）
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerEntry>,
    order: Vec<String>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Worker；同名 Worker 会被替换，但保留原注册位置
    pub fn register(&mut self, worker: impl Worker + 'static) {
        self.register_arc(Arc::new(worker));
    }

    pub fn register_arc(&mut self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        if !self.workers.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.workers.insert(
            name,
            WorkerEntry {
                worker,
                active_tasks: RwLock::new(Vec::new()),
                invocations: AtomicU64::new(0),
            },
        );
    }

    pub fn get(&self, name: &str) -> CollabResult<Arc<dyn Worker>> {
        self.workers
            .get(name)
            .map(|e| Arc::clone(&e.worker))
            .ok_or_else(|| CollabError::NotFound(format!("worker {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// 按注册顺序返回 (name, worker)
    pub fn all(&self) -> Vec<(String, Arc<dyn Worker>)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.workers
                    .get(name)
                    .map(|e| (name.clone(), Arc::clone(&e.worker)))
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn registration_index(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    /// 规划阶段解析参与者：任一名字未注册即返回 UnknownWorker
    pub fn resolve(&self, names: &[String]) -> CollabResult<Vec<Arc<dyn Worker>>> {
        names
            .iter()
            .map(|name| {
                self.workers
                    .get(name)
                    .map(|e| Arc::clone(&e.worker))
                    .ok_or_else(|| CollabError::UnknownWorker(name.clone()))
            })
            .collect()
    }

    /// 调用指定 Worker；Worker 返回 Err 转为 WorkerExecution，输出 JSON 审计日志
    pub async fn execute(&self, name: &str, ctx: &WorkerContext) -> CollabResult<WorkerResult> {
        let entry = self
            .workers
            .get(name)
            .ok_or_else(|| CollabError::UnknownWorker(name.to_string()))?;
        entry.invocations.fetch_add(1, Ordering::Relaxed);

        let start = Instant::now();
        // panic 视同执行失败
        let result = match AssertUnwindSafe(entry.worker.execute(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(format!("worker panicked: {}", panic_message(panic.as_ref()))),
        };

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(_) => (false, "error"),
        };
        let audit = serde_json::json!({
            "event": "worker_audit",
            "worker": name,
            "session": ctx.session_id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "worker");

        match result {
            Ok(output) => Ok(WorkerResult::success(name, output)),
            Err(message) => Err(CollabError::WorkerExecution {
                worker: name.to_string(),
                message,
            }),
        }
    }

    pub fn invocations(&self, name: &str) -> u64 {
        self.workers
            .get(name)
            .map(|e| e.invocations.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// 将任务 ID 放入 Worker 的在途队列，返回队列中的位置（从 1 开始）
    pub async fn enqueue_task(&self, name: &str, task_id: &str) -> CollabResult<usize> {
        let entry = self
            .workers
            .get(name)
            .ok_or_else(|| CollabError::NotFound(format!("worker {name}")))?;
        let mut queue = entry.active_tasks.write().await;
        queue.push(task_id.to_string());
        Ok(queue.len())
    }

    /// 从在途队列移除任务；任务不存在返回 false
    pub async fn complete_task(&self, name: &str, task_id: &str) -> CollabResult<bool> {
        let entry = self
            .workers
            .get(name)
            .ok_or_else(|| CollabError::NotFound(format!("worker {name}")))?;
        let mut queue = entry.active_tasks.write().await;
        let before = queue.len();
        queue.retain(|id| id != task_id);
        Ok(queue.len() != before)
    }

    pub async fn active_tasks(&self, name: &str) -> Vec<String> {
        match self.workers.get(name) {
            Some(entry) => entry.active_tasks.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// 所有 Worker 的状态快照（按注册顺序）
    pub async fn status(&self) -> Vec<WorkerStatus> {
        let mut out = Vec::with_capacity(self.order.len());
        for name in &self.order {
            if let Some(entry) = self.workers.get(name) {
                out.push(WorkerStatus {
                    name: name.clone(),
                    role: entry.worker.role(),
                    capabilities: entry.worker.capabilities().to_vec(),
                    active_tasks: entry.active_tasks.read().await.len(),
                    invocations: entry.invocations.load(Ordering::Relaxed),
                });
            }
        }
        out
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::types::{CollaborationMode, Requirements};

    struct FixedWorker {
        name: String,
        caps: Vec<String>,
        fail: bool,
    }

    #[async_trait]
    impl Worker for FixedWorker {
        fn name(&self) -> &str {
            &self.name
        }

        fn role(&self) -> WorkerRole {
            WorkerRole::Design
        }

        fn capabilities(&self) -> &[String] {
            &self.caps
        }

        async fn execute(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
            if self.fail {
                Err("design tool offline".to_string())
            } else {
                Ok(WorkerOutput::new("ui_design", serde_json::json!({"quality_score": 80.0})))
            }
        }
    }

    struct PanickingWorker;

    #[async_trait]
    impl Worker for PanickingWorker {
        fn name(&self) -> &str {
            "unstable"
        }

        fn role(&self) -> WorkerRole {
            WorkerRole::Implementation
        }

        fn capabilities(&self) -> &[String] {
            &[]
        }

        async fn execute(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
            panic!("worker blew up");
        }
    }

    fn fixed(name: &str, fail: bool) -> FixedWorker {
        FixedWorker {
            name: name.to_string(),
            caps: vec!["ui design".to_string()],
            fail,
        }
    }

    fn ctx() -> WorkerContext {
        WorkerContext::new("s1", "t", "d", CollaborationMode::Parallel, Requirements::default())
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = WorkerRegistry::new();
        registry.register(fixed("b", false));
        registry.register(fixed("a", false));

        assert!(registry.get("a").is_ok());
        assert!(matches!(registry.get("ghost"), Err(CollabError::NotFound(_))));
        assert_eq!(registry.names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(registry.registration_index("a"), Some(1));
    }

    #[test]
    fn test_resolve_unknown_worker() {
        let mut registry = WorkerRegistry::new();
        registry.register(fixed("a", false));
        let err = registry
            .resolve(&["a".to_string(), "ghost".to_string()])
            .err()
            .unwrap();
        assert_eq!(err, CollabError::UnknownWorker("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_execute_counts_and_wraps_errors() {
        let mut registry = WorkerRegistry::new();
        registry.register(fixed("ok", false));
        registry.register(fixed("bad", true));

        let result = registry.execute("ok", &ctx()).await.unwrap();
        assert_eq!(result.worker, "ok");
        assert_eq!(result.kind, "ui_design");

        let err = registry.execute("bad", &ctx()).await.unwrap_err();
        assert!(matches!(err, CollabError::WorkerExecution { .. }));
        assert_eq!(registry.invocations("ok"), 1);
        assert_eq!(registry.invocations("bad"), 1);
    }

    #[tokio::test]
    async fn test_execute_catches_panic() {
        let mut registry = WorkerRegistry::new();
        registry.register(PanickingWorker);

        let err = registry.execute("unstable", &ctx()).await.unwrap_err();
        assert_eq!(
            err,
            CollabError::WorkerExecution {
                worker: "unstable".to_string(),
                message: "worker panicked: worker blew up".to_string(),
            }
        );
        assert_eq!(registry.invocations("unstable"), 1);
    }

    #[tokio::test]
    async fn test_task_queue() {
        let mut registry = WorkerRegistry::new();
        registry.register(fixed("a", false));

        assert_eq!(registry.enqueue_task("a", "task_1").await.unwrap(), 1);
        assert_eq!(registry.enqueue_task("a", "task_2").await.unwrap(), 2);
        assert!(registry.complete_task("a", "task_1").await.unwrap());
        assert!(!registry.complete_task("a", "task_1").await.unwrap());
        assert_eq!(registry.active_tasks("a").await, vec!["task_2".to_string()]);
        assert!(registry.enqueue_task("ghost", "t").await.is_err());

        let status = registry.status().await;
        assert_eq!(status[0].active_tasks, 1);
    }
}
