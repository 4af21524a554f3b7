//! 脚本化 Worker（本地运行用，无需外部能力提供方）
//!
//! 负载由配置决定（quality_score / requires_adaptation），并回填上下文摘要，
//! 便于本地跑通四种协作模式与冲突检测流程。

use async_trait::async_trait;

use crate::config::WorkerSection;
use crate::worker::{Worker, WorkerContext, WorkerOutput, WorkerRole};

/// 脚本化 Worker：按配置产出结构化结果
#[derive(Debug, Clone)]
pub struct ScriptedWorker {
    name: String,
    role: WorkerRole,
    capabilities: Vec<String>,
    kind: String,
    quality_score: Option<f64>,
    requires_adaptation: bool,
}

impl ScriptedWorker {
    pub fn new(name: impl Into<String>, role: WorkerRole, capabilities: Vec<String>) -> Self {
        let kind = role.default_action().to_string();
        Self {
            name: name.into(),
            role,
            capabilities,
            kind,
            quality_score: None,
            requires_adaptation: false,
        }
    }

    pub fn from_config(section: &WorkerSection) -> Self {
        let role: WorkerRole = section
            .role
            .parse()
            .unwrap_or_else(|_| WorkerRole::Other(section.role.clone()));
        let mut worker = Self::new(section.name.clone(), role, section.capabilities.clone());
        if let Some(kind) = &section.kind {
            worker = worker.with_kind(kind.clone());
        }
        worker.quality_score = section.quality_score;
        worker.requires_adaptation = section.requires_adaptation;
        worker
    }

    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// 默认的三角色组合：planner / designer / coder
    pub fn default_team() -> Vec<ScriptedWorker> {
        vec![
            ScriptedWorker::new(
                "planner",
                WorkerRole::StrategicPlanning,
                vec![
                    "strategy planning".to_string(),
                    "project management".to_string(),
                    "documentation".to_string(),
                    "quality management".to_string(),
                ],
            )
            .with_quality(95.0),
            ScriptedWorker::new(
                "designer",
                WorkerRole::Design,
                vec![
                    "ui design".to_string(),
                    "prototyping".to_string(),
                    "design system".to_string(),
                ],
            )
            .with_quality(88.0),
            ScriptedWorker::new(
                "coder",
                WorkerRole::Implementation,
                vec![
                    "code generation".to_string(),
                    "optimization".to_string(),
                    "testing".to_string(),
                ],
            )
            .with_quality(90.0),
        ]
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> WorkerRole {
        self.role.clone()
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn execute(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let peers_seen = match &ctx.peers {
            Some(board) => board.snapshot().await.len(),
            None => 0,
        };

        let mut payload = serde_json::json!({
            "title": ctx.title,
            "role": self.role,
            "inputs_seen": ctx.previous_results.len(),
            "peers_seen": peers_seen,
            "round": ctx.round,
            "step_id": ctx.step_id,
        });
        if let Some(score) = self.quality_score {
            payload["quality_score"] = serde_json::json!(score);
        }
        // 只在首次执行该 Worker 的步骤上请求调整，避免自适应步骤无限追加
        if self.requires_adaptation
            && ctx
                .step_id
                .as_deref()
                .map(|s| !s.starts_with("adaptive"))
                .unwrap_or(false)
        {
            payload["requires_adaptation"] = serde_json::json!(true);
        }

        Ok(WorkerOutput::new(self.kind.clone(), payload))
    }
}
