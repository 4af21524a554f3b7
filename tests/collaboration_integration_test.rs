//! 协作集成测试：经由 CollaborationService 驱动四种模式、冲突处理与指标

use std::sync::Arc;

use async_trait::async_trait;
use hive::collab::types::{SessionResults, TimelineAction};
use hive::config::WorkerSection;
use hive::conflict::{
    Conflict, ConflictDetector, ConflictResolver, ConflictRule, ConflictStatus, ConflictType,
    Severity,
};
use hive::worker::{ScriptedWorker, WorkerContext, WorkerOutput, WorkerResult};
use hive::{
    AppConfig, CollabError, CollaborationEngine, CollaborationMode, CollaborationRequest,
    CollaborationService, PerformanceTracker, SessionStatus, Worker, WorkerRegistry, WorkerRole,
};

/// 返回固定质量分的 Worker，可配置为失败
struct ScoredWorker {
    name: String,
    role: WorkerRole,
    caps: Vec<String>,
    score: f64,
    fail: bool,
}

impl ScoredWorker {
    fn new(name: &str, role: WorkerRole, score: f64) -> Self {
        Self {
            name: name.to_string(),
            role,
            caps: vec!["analysis".to_string()],
            score,
            fail: false,
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Worker for ScoredWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> WorkerRole {
        self.role.clone()
    }

    fn capabilities(&self) -> &[String] {
        &self.caps
    }

    async fn execute(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        if self.fail {
            return Err(format!("{} crashed", self.name));
        }
        Ok(WorkerOutput::new(
            "report",
            serde_json::json!({
                "quality_score": self.score,
                "title": ctx.title,
            }),
        ))
    }
}

/// 执行时直接 panic 的 Worker
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

fn service_with(workers: Vec<ScoredWorker>) -> CollaborationService {
    let mut registry = WorkerRegistry::new();
    for w in workers {
        registry.register(w);
    }
    let engine = CollaborationEngine::new(
        Arc::new(registry),
        Arc::new(PerformanceTracker::new()),
        &AppConfig::default(),
    );
    CollaborationService::new(engine)
}

fn scored_team() -> Vec<ScoredWorker> {
    vec![
        ScoredWorker::new("planner", WorkerRole::StrategicPlanning, 95.0),
        ScoredWorker::new("designer", WorkerRole::Design, 40.0),
        ScoredWorker::new("coder", WorkerRole::Implementation, 92.0),
    ]
}

fn request(mode: CollaborationMode, participants: &[&str]) -> CollaborationRequest {
    CollaborationRequest::new(
        "Collaboration platform",
        mode,
        participants.iter().map(|s| s.to_string()).collect(),
    )
}

#[tokio::test]
async fn test_parallel_quality_conflicts() {
    let service = service_with(scored_team());
    let id = service
        .submit(request(CollaborationMode::Parallel, &["planner", "designer", "coder"]))
        .await
        .unwrap();
    let session = service.wait_for(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.conflicts.len(), 2);
    for conflict in &session.conflicts {
        assert_eq!(conflict.conflict_type, ConflictType::Quality);
        assert_eq!(conflict.status, ConflictStatus::Resolved);
        assert!(conflict.workers.contains(&"designer".to_string()));
    }

    let report = service.conflicts().await;
    assert_eq!(report.history.len(), 2);
    assert!(report.history.iter().all(|r| r.strategy == "standardize"));
    assert_eq!(report.resolution_rate, 100.0);
    assert_eq!(service.metrics().await.conflicts_resolved, 2);
}

#[tokio::test]
async fn test_unknown_participant_rejected() {
    let service = service_with(scored_team());
    let err = service
        .submit(request(CollaborationMode::Sequential, &["planner", "ghost"]))
        .await
        .unwrap_err();

    assert_eq!(err, CollabError::UnknownWorker("ghost".to_string()));
    assert!(service.list_sessions().await.is_empty());
    assert_eq!(service.metrics().await.total_sessions, 0);
}

#[tokio::test]
async fn test_sequential_order_and_failure_isolation() {
    let service = service_with(vec![
        ScoredWorker::new("planner", WorkerRole::StrategicPlanning, 90.0),
        ScoredWorker::new("designer", WorkerRole::Design, 90.0).failing(),
        ScoredWorker::new("coder", WorkerRole::Implementation, 90.0),
    ]);
    let id = service
        .submit(request(CollaborationMode::Sequential, &["coder", "designer", "planner"]))
        .await
        .unwrap();
    let session = service.wait_for(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    let workers: Vec<&str> = session.timeline.iter().map(|t| t.worker.as_str()).collect();
    assert_eq!(workers, vec!["planner", "designer", "coder"]);
    assert_eq!(session.timeline[1].action, TimelineAction::TaskFailed);
    assert_eq!(session.timeline[1].summary, "designer crashed");

    let designer = session.results.latest_for("designer").unwrap();
    assert!(!designer.result.is_success());
    assert_eq!(designer.result.payload["error"], "designer crashed");
}

#[tokio::test]
async fn test_panicking_worker_becomes_error_result() {
    let mut registry = WorkerRegistry::new();
    registry.register(ScoredWorker::new("planner", WorkerRole::StrategicPlanning, 90.0));
    registry.register(PanickingWorker);
    let service = CollaborationService::new(CollaborationEngine::new(
        Arc::new(registry),
        Arc::new(PerformanceTracker::new()),
        &AppConfig::default(),
    ));

    let id = service
        .submit(request(CollaborationMode::Parallel, &["planner", "unstable"]))
        .await
        .unwrap();
    let session = service.wait_for(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.results.len(), 2);
    assert!(session.results.latest_for("planner").unwrap().result.is_success());
    let unstable = session.results.latest_for("unstable").unwrap();
    assert!(!unstable.result.is_success());
    assert_eq!(
        unstable.result.payload["error"],
        "worker panicked: worker blew up"
    );

    assert_eq!(service.metrics().await.total_sessions, 1);
    assert_eq!(service.system_status().await.active_sessions, 0);
}

#[tokio::test]
async fn test_interactive_three_rounds() {
    let service = service_with(scored_team());
    let id = service
        .submit(request(CollaborationMode::Interactive, &["planner", "coder"]))
        .await
        .unwrap();
    let session = service.wait_for(&id).await.unwrap();

    match &session.results {
        SessionResults::Rounds { rounds } => {
            assert_eq!(rounds.len(), 3);
            assert!(rounds.iter().all(|r| r.entries.len() == 2 && r.feedback.len() == 2));
            assert_eq!(rounds[0].feedback[0].appreciations.len(), 1);
        }
        other => panic!("unexpected results {:?}", other),
    }
    assert!(session.conflicts.is_empty());
}

#[tokio::test]
async fn test_autonomous_adaptation_from_config_workers() {
    let mut config = AppConfig::default();
    config.workers = vec![
        WorkerSection {
            name: "planner".to_string(),
            role: "planning".to_string(),
            capabilities: vec!["strategy".to_string()],
            kind: None,
            quality_score: Some(90.0),
            requires_adaptation: true,
        },
        WorkerSection {
            name: "designer".to_string(),
            role: "design".to_string(),
            capabilities: vec!["ui design".to_string()],
            kind: None,
            quality_score: Some(85.0),
            requires_adaptation: false,
        },
        WorkerSection {
            name: "coder".to_string(),
            role: "implementation".to_string(),
            capabilities: vec!["code generation".to_string()],
            kind: None,
            quality_score: Some(88.0),
            requires_adaptation: false,
        },
    ];
    let service = CollaborationService::from_config(&config);

    let id = service
        .submit(request(CollaborationMode::Autonomous, &["planner", "designer", "coder"]))
        .await
        .unwrap();
    let session = service.wait_for(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    match &session.results {
        SessionResults::Steps { steps, plan } => {
            let plan = plan.as_ref().unwrap();
            assert_eq!(plan.steps.len(), 4);
            let adaptive = &plan.steps[3];
            assert_eq!(adaptive.action, "additional_design");
            assert_eq!(adaptive.dependencies, vec!["step_1".to_string()]);
            assert_eq!(steps.len(), 4);
        }
        other => panic!("unexpected results {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_sessions_share_metrics() {
    let service = Arc::new(CollaborationService::from_config(&AppConfig::default()));
    let team = ["planner", "designer", "coder"];

    let a = service
        .submit(request(CollaborationMode::Parallel, &team))
        .await
        .unwrap();
    let b = service
        .submit(request(CollaborationMode::Interactive, &team))
        .await
        .unwrap();
    service.wait_for(&a).await.unwrap();
    service.wait_for(&b).await.unwrap();

    let metrics = service.metrics().await;
    assert_eq!(metrics.total_sessions, 2);
    assert_eq!(metrics.successful_sessions, 2);
    assert_eq!(metrics.worker_utilization.get("coder"), Some(&2));

    let status = service.system_status().await;
    assert_eq!(status.total_sessions, 2);
    assert_eq!(status.active_sessions, 0);
}

/// 每对结果都报告一个时间冲突
struct LateRule;

impl ConflictRule for LateRule {
    fn conflict_type(&self) -> ConflictType {
        ConflictType::Timeline
    }

    fn check(&self, a: &WorkerResult, b: &WorkerResult) -> Option<Conflict> {
        Some(Conflict::new(
            ConflictType::Timeline,
            vec![a.worker.clone(), b.worker.clone()],
            "behind schedule",
            Severity::Low,
        ))
    }
}

#[tokio::test]
async fn test_conflict_without_strategy_stays_listed() {
    let mut registry = WorkerRegistry::new();
    for w in scored_team() {
        registry.register(w);
    }
    let tracker = Arc::new(PerformanceTracker::new());
    let engine = CollaborationEngine::new(
        Arc::new(registry),
        Arc::clone(&tracker),
        &AppConfig::default(),
    )
    .with_detector(ConflictDetector::empty().with_rule(LateRule))
    .with_resolver(ConflictResolver::empty(Arc::clone(&tracker)));

    let session = engine
        .start(request(CollaborationMode::Parallel, &["planner", "coder"]))
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.conflicts.len(), 1);
    assert_eq!(session.conflicts[0].status, ConflictStatus::Unresolved);
    assert!(tracker.conflict_report().await.history.is_empty());
}

#[tokio::test]
async fn test_scripted_default_team_runs() {
    let service = CollaborationService::from_config(&AppConfig::default());
    let team = ScriptedWorker::default_team();
    assert_eq!(team.len(), 3);

    let mut req = request(CollaborationMode::Sequential, &["planner", "designer", "coder"]);
    req.requirements.skills = vec!["testing".to_string()];
    let id = service.submit(req).await.unwrap();
    let session = service.wait_for(&id).await.unwrap();

    assert_eq!(session.participants["coder"].capability_match, 1.0);
    assert_eq!(session.participants["planner"].capability_match, 0.0);
    assert_eq!(session.results.len(), 3);
}
