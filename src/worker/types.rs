//! Worker 调用上下文与结果类型
//!
//! WorkerResult 一经创建即不可变，会话中以 Arc 引用保存；
//! PeerBoard 用于 interactive 模式下同轮结果的实时可见。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::collab::types::{CollaborationMode, Requirements};

/// 结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Worker 执行成功时返回的原始输出：结果类型标签 + 任意结构化负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub kind: String,
    pub payload: Value,
}

impl WorkerOutput {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// 单次 Worker 调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// 产出结果的 Worker 名称
    pub worker: String,
    /// 结果类型标签（如 strategic_analysis / ui_design）
    pub kind: String,
    /// 结构化负载；开启冲突检测时应包含数值 quality_score
    pub payload: Value,
    pub status: ResultStatus,
    /// 完成时间（毫秒时间戳）
    pub completed_at: i64,
}

impl WorkerResult {
    pub fn success(worker: impl Into<String>, output: WorkerOutput) -> Self {
        Self {
            worker: worker.into(),
            kind: output.kind,
            payload: output.payload,
            status: ResultStatus::Success,
            completed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 失败结果：错误信息作为负载
    pub fn failure(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            kind: "error".to_string(),
            payload: serde_json::json!({ "error": message.into() }),
            status: ResultStatus::Error,
            completed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn quality_score(&self) -> Option<f64> {
        self.payload.get("quality_score").and_then(Value::as_f64)
    }

    /// autonomous 模式：结果是否要求调整计划
    pub fn requires_adaptation(&self) -> bool {
        self.payload
            .get("requires_adaptation")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self.status {
            ResultStatus::Error => Some(
                self.payload
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error"),
            ),
            ResultStatus::Success => None,
        }
    }

    /// 时间线用的一行摘要：失败时为错误信息，否则为 "<worker>: <kind> completed"
    pub fn summary(&self) -> String {
        match self.error_message() {
            Some(msg) => msg.to_string(),
            None => format!("{}: {} completed", self.worker, self.kind),
        }
    }
}

/// 同轮结果看板：interactive 模式下每个 Worker 完成后即写入，其他 Worker 可随时读取
#[derive(Debug, Clone, Default)]
pub struct PeerBoard {
    inner: Arc<RwLock<Vec<Arc<WorkerResult>>>>,
}

impl PeerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, result: Arc<WorkerResult>) {
        self.inner.write().await.push(result);
    }

    /// 当前已完成的同轮结果（按完成顺序）
    pub async fn snapshot(&self) -> Vec<Arc<WorkerResult>> {
        self.inner.read().await.clone()
    }
}

/// 传给 Worker::execute 的上下文
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub session_id: String,
    pub title: String,
    pub description: String,
    pub mode: CollaborationMode,
    pub requirements: Requirements,
    /// sequential / autonomous：此前所有结果（按产出顺序）
    pub previous_results: Vec<Arc<WorkerResult>>,
    /// interactive：当前轮次（从 1 开始）
    pub round: Option<usize>,
    /// interactive：此前各轮的结果
    pub prior_rounds: Vec<Vec<Arc<WorkerResult>>>,
    /// interactive：同轮结果看板
    pub peers: Option<PeerBoard>,
    /// autonomous：当前步骤 ID 与动作
    pub step_id: Option<String>,
    pub action: Option<String>,
}

impl WorkerContext {
    /// 只含会话元数据的上下文（parallel 模式）
    pub fn new(
        session_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        mode: CollaborationMode,
        requirements: Requirements,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            title: title.into(),
            description: description.into(),
            mode,
            requirements,
            previous_results: Vec::new(),
            round: None,
            prior_rounds: Vec::new(),
            peers: None,
            step_id: None,
            action: None,
        }
    }

    pub fn with_previous(mut self, previous: Vec<Arc<WorkerResult>>) -> Self {
        self.previous_results = previous;
        self
    }

    pub fn with_round(
        mut self,
        round: usize,
        prior_rounds: Vec<Vec<Arc<WorkerResult>>>,
        peers: PeerBoard,
    ) -> Self {
        self.round = Some(round);
        self.prior_rounds = prior_rounds;
        self.peers = Some(peers);
        self
    }

    pub fn with_step(mut self, step_id: impl Into<String>, action: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self.action = Some(action.into());
        self
    }
}
