//! 协作引擎
//!
//! start = prepare + run：
//! 1. prepare：校验请求、生成执行计划、为每个参与者生成准备记录
//! 2. run：按计划执行（sequential / parallel / interactive / autonomous），
//!    每个执行单元（步骤、轮次、批次）结束后检测并解决冲突，把解决记录挂到相关结果旁，
//!    通过 watch 通道发布会话快照
//! 3. 计划执行完毕后会话进入终态，并交给 PerformanceTracker 记录
//!
//! Worker 失败只产生一条 status=error 的结果，不会中止会话。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;

use crate::collab::feedback::round_feedback;
use crate::collab::planner::{AutonomousPlan, ExecutionPlan, ExecutionPlanner};
use crate::collab::types::{
    CollaborationRequest, Preparation, ResultEntry, RoundRecord, Session, SessionResults,
    StepRecord, TimelineAction, TimelineEntry,
};
use crate::config::{AppConfig, CollaborationSection, RolesSection};
use crate::conflict::{Conflict, ConflictDetector, ConflictResolution, ConflictResolver, ResolutionContext};
use crate::core::{CollabError, CollabResult};
use crate::metrics::PerformanceTracker;
use crate::worker::{match_capabilities, PeerBoard, WorkerContext, WorkerRegistry, WorkerResult};

/// autonomous 步骤的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// 协作引擎
pub struct CollaborationEngine {
    registry: Arc<WorkerRegistry>,
    planner: ExecutionPlanner,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    tracker: Arc<PerformanceTracker>,
    settings: CollaborationSection,
    roles: RolesSection,
}

impl CollaborationEngine {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        tracker: Arc<PerformanceTracker>,
        config: &AppConfig,
    ) -> Self {
        Self {
            registry,
            planner: ExecutionPlanner::new(&config.collaboration, config.roles.clone()),
            detector: ConflictDetector::new(config.collaboration.quality_gap_threshold),
            resolver: ConflictResolver::new(Arc::clone(&tracker)),
            tracker,
            settings: config.collaboration.clone(),
            roles: config.roles.clone(),
        }
    }

    /// 替换冲突检测规则集
    pub fn with_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = detector;
        self
    }

    /// 替换冲突解决器（应与引擎共用同一个 tracker）
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// 同步执行整个会话
    pub async fn start(&self, request: CollaborationRequest) -> CollabResult<Session> {
        let (session, plan) = self.prepare(request)?;
        Ok(self.run(session, plan, None).await)
    }

    /// 校验并规划；失败时不创建会话、不影响指标
    pub fn prepare(&self, request: CollaborationRequest) -> CollabResult<(Session, ExecutionPlan)> {
        request.validate()?;
        let plan = self.planner.plan(&request, &self.registry)?;

        let mut participants = BTreeMap::new();
        for worker in self.registry.resolve(&request.participants)? {
            let role = worker.role();
            let profile = self.roles.profile_for(&role);
            participants.insert(
                worker.name().to_string(),
                Preparation {
                    role,
                    ready: true,
                    capability_match: match_capabilities(
                        worker.capabilities(),
                        &request.requirements.skills,
                    ),
                    expected_contribution: profile.contribution,
                },
            );
        }

        tracing::info!(
            session = %request.id,
            mode = %request.mode,
            participants = request.participants.len(),
            "session prepared"
        );
        Ok((Session::new(request, participants), plan))
    }

    /// 执行计划直到结束；progress 为 Some 时在每个执行单元后发布快照
    pub async fn run(
        &self,
        mut session: Session,
        plan: ExecutionPlan,
        progress: Option<watch::Sender<Session>>,
    ) -> Session {
        let progress = progress.as_ref();
        let rctx = self.resolution_context(&session);
        tracing::debug!(session = %session.id, mode = %plan.mode(), "executing plan");

        let outcome = match plan {
            ExecutionPlan::Sequential { order } => {
                self.run_sequential(&mut session, &order, &rctx, progress).await
            }
            ExecutionPlan::Parallel { batch } => {
                self.run_parallel(&mut session, &batch, &rctx, progress).await
            }
            ExecutionPlan::Interactive {
                rounds,
                participants,
            } => {
                self.run_interactive(&mut session, rounds, &participants, &rctx, progress)
                    .await
            }
            ExecutionPlan::Autonomous(plan) => {
                self.run_autonomous(&mut session, plan, &rctx, progress).await
            }
        };

        match outcome {
            Ok(()) => session.complete(),
            Err(e) => {
                tracing::error!(session = %session.id, error = %e, "session failed");
                session.fail(e.to_string());
            }
        }

        self.tracker.record(&session).await;
        publish(&session, progress);

        tracing::info!(
            session = %session.id,
            status = ?session.status,
            results = session.results.len(),
            conflicts = session.conflicts.len(),
            duration_secs = session.duration_secs.unwrap_or(0.0),
            "session finished"
        );
        session
    }

    fn base_context(&self, session: &Session) -> WorkerContext {
        let req = &session.request;
        WorkerContext::new(
            session.id.clone(),
            req.title.clone(),
            req.description.clone(),
            req.mode,
            req.requirements.clone(),
        )
    }

    fn resolution_context(&self, session: &Session) -> ResolutionContext {
        let mut ctx = ResolutionContext::new(session.id.clone(), &self.settings);
        ctx.participants = session
            .request
            .participants
            .iter()
            .filter_map(|name| {
                session
                    .participants
                    .get(name)
                    .map(|prep| (name.clone(), self.roles.profile_for(&prep.role)))
            })
            .collect();
        if let Some(q) = session.request.requirements.quality_standard {
            ctx.quality_standard = q;
        }
        ctx.deadline = session.request.requirements.deadline;
        ctx
    }

    /// 调用 Worker；失败转为 status=error 的结果
    async fn invoke(&self, name: &str, ctx: &WorkerContext) -> Arc<WorkerResult> {
        match self.registry.execute(name, ctx).await {
            Ok(result) => Arc::new(result),
            Err(CollabError::WorkerExecution { worker, message }) => {
                tracing::warn!(session = %ctx.session_id, worker = %worker, error = %message, "worker failed");
                Arc::new(WorkerResult::failure(worker, message))
            }
            Err(e) => {
                tracing::warn!(session = %ctx.session_id, worker = %name, error = %e, "worker failed");
                Arc::new(WorkerResult::failure(name, e.to_string()))
            }
        }
    }

    /// 解决本单元检测到的冲突并加入会话冲突列表
    async fn settle(
        &self,
        session: &mut Session,
        mut conflicts: Vec<Conflict>,
        rctx: &ResolutionContext,
    ) -> Vec<ConflictResolution> {
        if conflicts.is_empty() {
            return Vec::new();
        }
        let resolutions = self.resolver.resolve_all(&mut conflicts, rctx).await;
        session.conflicts.extend(conflicts);
        resolutions
    }

    async fn run_sequential(
        &self,
        session: &mut Session,
        order: &[String],
        rctx: &ResolutionContext,
        progress: Option<&watch::Sender<Session>>,
    ) -> CollabResult<()> {
        let mut produced: Vec<Arc<WorkerResult>> = Vec::new();
        let mut entries: Vec<ResultEntry> = Vec::new();

        for name in order {
            let ctx = self.base_context(session).with_previous(produced.clone());
            let result = self.invoke(name, &ctx).await;
            session.timeline.push(TimelineEntry::from_result(&result));

            let conflicts = self.detector.detect_against(&result, &produced);
            let resolutions = self.settle(session, conflicts, rctx).await;

            entries.push(ResultEntry::new(Arc::clone(&result)));
            attach(entries.iter_mut(), &resolutions);
            produced.push(result);

            session.results = SessionResults::Flat {
                entries: entries.clone(),
            };
            publish(session, progress);
        }
        Ok(())
    }

    async fn run_parallel(
        &self,
        session: &mut Session,
        batch: &[String],
        rctx: &ResolutionContext,
        progress: Option<&watch::Sender<Session>>,
    ) -> CollabResult<()> {
        let ctx = self.base_context(session);
        let results: Vec<Arc<WorkerResult>> =
            join_all(batch.iter().map(|name| self.invoke(name, &ctx))).await;

        for result in &results {
            session.timeline.push(TimelineEntry::from_result(result));
        }

        let conflicts = self.detector.detect_all(&results);
        let resolutions = self.settle(session, conflicts, rctx).await;

        let mut entries: Vec<ResultEntry> = results.into_iter().map(ResultEntry::new).collect();
        attach(entries.iter_mut(), &resolutions);

        session.results = SessionResults::Flat { entries };
        publish(session, progress);
        Ok(())
    }

    async fn run_interactive(
        &self,
        session: &mut Session,
        rounds: usize,
        participants: &[String],
        rctx: &ResolutionContext,
        progress: Option<&watch::Sender<Session>>,
    ) -> CollabResult<()> {
        let mut prior: Vec<Vec<Arc<WorkerResult>>> = Vec::new();
        let mut records: Vec<RoundRecord> = Vec::new();

        for round in 1..=rounds {
            let board = PeerBoard::new();
            let ctx = self
                .base_context(session)
                .with_round(round, prior.clone(), board.clone());

            let results: Vec<Arc<WorkerResult>> =
                join_all(participants.iter().map(|name| {
                    let ctx = &ctx;
                    let board = &board;
                    async move {
                        let result = self.invoke(name, ctx).await;
                        board.publish(Arc::clone(&result)).await;
                        result
                    }
                }))
                .await;

            for result in &results {
                session
                    .timeline
                    .push(TimelineEntry::from_result(result).in_round(round));
            }

            let conflicts = self.detector.detect_all(&results);
            let resolutions = self.settle(session, conflicts, rctx).await;

            let mut entries: Vec<ResultEntry> =
                results.iter().cloned().map(ResultEntry::new).collect();
            attach(entries.iter_mut(), &resolutions);

            records.push(RoundRecord {
                round,
                entries,
                feedback: round_feedback(participants, &results),
            });
            prior.push(results);

            tracing::debug!(session = %session.id, round, "round finished");
            session.results = SessionResults::Rounds {
                rounds: records.clone(),
            };
            publish(session, progress);
        }
        Ok(())
    }

    async fn run_autonomous(
        &self,
        session: &mut Session,
        mut plan: AutonomousPlan,
        rctx: &ResolutionContext,
        progress: Option<&watch::Sender<Session>>,
    ) -> CollabResult<()> {
        let mut outcomes: HashMap<String, StepOutcome> = HashMap::new();
        let mut produced: Vec<Arc<WorkerResult>> = Vec::new();
        let mut records: Vec<StepRecord> = Vec::new();

        session.results = SessionResults::Steps {
            steps: Vec::new(),
            plan: Some(plan.clone()),
        };

        loop {
            let next = plan
                .steps
                .iter()
                .find(|s| {
                    !outcomes.contains_key(&s.id)
                        && s.dependencies.iter().all(|d| outcomes.contains_key(d))
                })
                .cloned();
            let Some(step) = next else { break };

            let blocked = step
                .dependencies
                .iter()
                .any(|d| outcomes.get(d) != Some(&StepOutcome::Succeeded));
            if blocked {
                tracing::warn!(session = %session.id, step = %step.id, "step skipped: dependency did not succeed");
                outcomes.insert(step.id.clone(), StepOutcome::Skipped);
                session.timeline.push(
                    TimelineEntry::new(
                        step.worker.clone(),
                        TimelineAction::StepSkipped,
                        format!("{} skipped: dependency did not succeed", step.id),
                    )
                    .in_step(step.id.clone()),
                );
                publish(session, progress);
                continue;
            }

            let ctx = self
                .base_context(session)
                .with_previous(produced.clone())
                .with_step(step.id.clone(), step.action.clone());
            let result = self.invoke(&step.worker, &ctx).await;
            session
                .timeline
                .push(TimelineEntry::from_result(&result).in_step(step.id.clone()));
            outcomes.insert(
                step.id.clone(),
                if result.is_success() {
                    StepOutcome::Succeeded
                } else {
                    StepOutcome::Failed
                },
            );

            let conflicts = self.detector.detect_against(&result, &produced);
            let resolutions = self.settle(session, conflicts, rctx).await;

            records.push(StepRecord {
                step_id: step.id.clone(),
                action: step.action.clone(),
                entry: ResultEntry::new(Arc::clone(&result)),
            });
            attach(records.iter_mut().map(|r| &mut r.entry), &resolutions);

            if result.is_success() && result.requires_adaptation() {
                match plan.adapt(&step.id) {
                    Some(added) => {
                        tracing::info!(session = %session.id, trigger = %step.id, step = %added.id, "plan adapted");
                        session.timeline.push(
                            TimelineEntry::new(
                                added.worker.clone(),
                                TimelineAction::PlanAdapted,
                                format!("{} added after {}", added.id, step.id),
                            )
                            .in_step(added.id),
                        );
                    }
                    None => {
                        tracing::warn!(session = %session.id, trigger = %step.id, "adaptation limit reached");
                    }
                }
            }
            produced.push(result);

            session.results = SessionResults::Steps {
                steps: records.clone(),
                plan: Some(plan.clone()),
            };
            publish(session, progress);
        }

        if outcomes.len() < plan.steps.len() {
            let pending: Vec<&str> = plan
                .steps
                .iter()
                .filter(|s| !outcomes.contains_key(&s.id))
                .map(|s| s.id.as_str())
                .collect();
            return Err(CollabError::CyclicDependency(pending.join(", ")));
        }

        session.results = SessionResults::Steps {
            steps: records,
            plan: Some(plan),
        };
        Ok(())
    }
}

/// 把解决记录挂到受影响 Worker 的最近一个结果条目上
fn attach<'a, I>(entries: I, resolutions: &[ConflictResolution])
where
    I: DoubleEndedIterator<Item = &'a mut ResultEntry>,
{
    if resolutions.is_empty() {
        return;
    }
    let mut attached: HashSet<(usize, String)> = HashSet::new();
    for entry in entries.rev() {
        for (idx, res) in resolutions.iter().enumerate() {
            if res.affected_workers.contains(&entry.worker)
                && attached.insert((idx, entry.worker.clone()))
            {
                entry.conflict_resolutions.push(res.into());
            }
        }
    }
}

fn publish(session: &Session, progress: Option<&watch::Sender<Session>>) {
    if let Some(tx) = progress {
        tx.send_replace(session.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::types::{CollaborationMode, SessionStatus};
    use crate::conflict::{ConflictStatus, ConflictType};
    use crate::worker::{Worker, WorkerOutput, WorkerRole};
    use async_trait::async_trait;

    struct StubWorker {
        name: String,
        role: WorkerRole,
        caps: Vec<String>,
        score: Option<f64>,
        fail: bool,
        adapt: bool,
    }

    impl StubWorker {
        fn new(name: &str, role: WorkerRole) -> Self {
            Self {
                name: name.to_string(),
                role,
                caps: vec![format!("{} work", name)],
                score: None,
                fail: false,
                adapt: false,
            }
        }

        fn score(mut self, score: f64) -> Self {
            self.score = Some(score);
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn adapting(mut self) -> Self {
            self.adapt = true;
            self
        }
    }

    #[async_trait]
    impl Worker for StubWorker {
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
                return Err(format!("{} unavailable", self.name));
            }
            let mut payload = serde_json::json!({
                "seen": ctx.previous_results.len(),
                "prior_rounds": ctx.prior_rounds.len(),
            });
            if let Some(score) = self.score {
                payload["quality_score"] = serde_json::json!(score);
            }
            let first_visit = ctx
                .step_id
                .as_deref()
                .map(|s| s.starts_with("step_"))
                .unwrap_or(false);
            if self.adapt && first_visit {
                payload["requires_adaptation"] = serde_json::json!(true);
            }
            Ok(WorkerOutput::new("work", payload))
        }
    }

    fn engine(workers: Vec<StubWorker>) -> CollaborationEngine {
        let mut registry = WorkerRegistry::new();
        for w in workers {
            registry.register(w);
        }
        CollaborationEngine::new(
            Arc::new(registry),
            Arc::new(PerformanceTracker::new()),
            &AppConfig::default(),
        )
    }

    fn team() -> Vec<StubWorker> {
        vec![
            StubWorker::new("planner", WorkerRole::StrategicPlanning).score(95.0),
            StubWorker::new("designer", WorkerRole::Design).score(40.0),
            StubWorker::new("coder", WorkerRole::Implementation).score(92.0),
        ]
    }

    fn request(mode: CollaborationMode, participants: &[&str]) -> CollaborationRequest {
        CollaborationRequest::new(
            "Platform",
            mode,
            participants.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_sequential_passes_previous_results() {
        let engine = engine(team());
        let session = engine
            .start(request(CollaborationMode::Sequential, &["coder", "designer", "planner"]))
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        let entries = session.results.entries();
        let order: Vec<&str> = entries.iter().map(|e| e.worker.as_str()).collect();
        assert_eq!(order, vec!["planner", "designer", "coder"]);
        assert_eq!(entries[2].result.payload["seen"], 2);
        // designer vs planner, coder vs designer
        assert_eq!(session.conflicts.len(), 2);
        assert_eq!(session.conflicts[0].workers, vec!["planner", "designer"]);
        assert_eq!(session.conflicts[1].workers, vec!["designer", "coder"]);
        for conflict in &session.conflicts {
            assert_eq!(conflict.conflict_type, ConflictType::Quality);
            assert_eq!(conflict.status, ConflictStatus::Resolved);
        }

        let report = engine.tracker().conflict_report().await;
        assert_eq!(report.history.len(), 2);
        assert!(report.history.iter().all(|r| r.strategy == "standardize" && r.success));
        let designer = session.results.latest_for("designer").unwrap();
        assert_eq!(designer.conflict_resolutions.len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_conflicts_resolved_and_attached() {
        let engine = engine(team());
        let session = engine
            .start(request(CollaborationMode::Parallel, &["planner", "designer", "coder"]))
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.conflicts.len(), 2);
        assert!(session
            .conflicts
            .iter()
            .all(|c| c.status == ConflictStatus::Resolved));

        let designer = session.results.latest_for("designer").unwrap();
        assert_eq!(designer.conflict_resolutions.len(), 2);
        assert!(designer
            .conflict_resolutions
            .iter()
            .all(|r| r.strategy == "standardize"));
        let planner = session.results.latest_for("planner").unwrap();
        assert_eq!(planner.conflict_resolutions.len(), 1);

        let metrics = engine.tracker().snapshot().await;
        assert_eq!(metrics.total_sessions, 1);
        assert_eq!(metrics.conflicts_resolved, 2);
    }

    #[tokio::test]
    async fn test_failed_worker_does_not_abort() {
        let engine = engine(vec![
            StubWorker::new("planner", WorkerRole::StrategicPlanning),
            StubWorker::new("designer", WorkerRole::Design).failing(),
            StubWorker::new("coder", WorkerRole::Implementation),
        ]);
        let session = engine
            .start(request(CollaborationMode::Sequential, &["planner", "designer", "coder"]))
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.results.len(), 3);
        let failed = &session.timeline[1];
        assert_eq!(failed.action, TimelineAction::TaskFailed);
        assert_eq!(failed.summary, "designer unavailable");
        assert_eq!(session.timeline[2].summary, "coder: work completed");
    }

    #[tokio::test]
    async fn test_interactive_rounds_and_feedback() {
        let engine = engine(team());
        let session = engine
            .start(request(CollaborationMode::Interactive, &["planner", "designer"]))
            .await
            .unwrap();

        match &session.results {
            SessionResults::Rounds { rounds } => {
                assert_eq!(rounds.len(), 3);
                for (i, round) in rounds.iter().enumerate() {
                    assert_eq!(round.entries.len(), 2);
                    assert_eq!(round.feedback.len(), 2);
                    assert_eq!(round.entries[0].result.payload["prior_rounds"], i);
                }
            }
            other => panic!("unexpected results {:?}", other),
        }
        // 每轮一个质量冲突
        assert_eq!(session.conflicts.len(), 3);
        assert_eq!(session.timeline.len(), 6);
    }

    #[tokio::test]
    async fn test_autonomous_adaptation() {
        let engine = engine(vec![
            StubWorker::new("planner", WorkerRole::StrategicPlanning).adapting(),
            StubWorker::new("designer", WorkerRole::Design),
            StubWorker::new("coder", WorkerRole::Implementation),
        ]);
        let session = engine
            .start(request(CollaborationMode::Autonomous, &["planner", "designer", "coder"]))
            .await
            .unwrap();

        match &session.results {
            SessionResults::Steps { steps, plan } => {
                let plan = plan.as_ref().unwrap();
                assert_eq!(plan.steps.len(), 4);
                assert_eq!(plan.steps[3].dependencies, vec!["step_1"]);
                assert_eq!(steps.len(), 4);
                assert_eq!(steps[3].step_id, "adaptive_step_4");
                assert_eq!(steps[3].entry.worker, "designer");
            }
            other => panic!("unexpected results {:?}", other),
        }
        assert!(session
            .timeline
            .iter()
            .any(|t| t.action == TimelineAction::PlanAdapted));
    }

    #[tokio::test]
    async fn test_autonomous_skips_after_failed_dependency() {
        let engine = engine(vec![
            StubWorker::new("planner", WorkerRole::StrategicPlanning).failing(),
            StubWorker::new("coder", WorkerRole::Implementation),
        ]);
        let session = engine
            .start(request(CollaborationMode::Autonomous, &["planner", "coder"]))
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.results.len(), 1);
        let last = session.timeline.last().unwrap();
        assert_eq!(last.action, TimelineAction::StepSkipped);
        assert_eq!(last.step_id.as_deref(), Some("step_2"));
    }

    #[tokio::test]
    async fn test_unknown_worker_rejected_without_metrics() {
        let engine = engine(team());
        let err = engine
            .start(request(CollaborationMode::Parallel, &["planner", "ghost"]))
            .await
            .unwrap_err();
        assert_eq!(err, CollabError::UnknownWorker("ghost".to_string()));
        assert_eq!(engine.tracker().snapshot().await.total_sessions, 0);
    }

    #[tokio::test]
    async fn test_preparation_capability_match() {
        let engine = engine(team());
        let mut req = request(CollaborationMode::Parallel, &["planner", "coder"]);
        req.requirements.skills = vec!["PLANNER".to_string(), "testing".to_string()];
        let (session, _) = engine.prepare(req).unwrap();
        assert_eq!(session.participants["planner"].capability_match, 0.5);
        assert_eq!(session.participants["coder"].capability_match, 0.0);
        assert_eq!(session.participants["coder"].role, WorkerRole::Implementation);
    }

    #[tokio::test]
    async fn test_progress_snapshots_published() {
        let engine = engine(team());
        let (session, plan) = engine
            .prepare(request(CollaborationMode::Sequential, &["planner", "designer"]))
            .unwrap();
        let (tx, rx) = watch::channel(session.clone());
        let finished = engine.run(session, plan, Some(tx)).await;

        let latest = rx.borrow().clone();
        assert_eq!(latest.status, SessionStatus::Completed);
        assert_eq!(latest, finished);
    }
}
