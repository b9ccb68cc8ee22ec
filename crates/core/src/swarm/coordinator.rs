//! # Pipeline Coordinator
//!
//! Runs one task through its stages, from the first stage to a terminal
//! report. The coordinator owns the timing of each stage, the fix loop and
//! the failure report; skills only talk to the agent.
//!
//! ```text
//! PipelineMachine ──stage──▶ execute() ──▶ Skill::run
//!        ▲                        │
//!        └── advance / tests_failed / fail ◀── StageOutcome | StageError
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::agent::AgentInvoker;
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::skills::{
    FastDevSkill, FastFinishSkill, FinalizerSkill, FixerSkill, ImplementerSkill, LocatorSkill,
    PlannerSkill, SimpleSkill, SkillContext, VerificationOutput, VerifierSkill,
};
use crate::state::{PipelineState, StageRecord, TaskFailure, TaskReport, TaskStore, TestRecord};

use super::classify::resolve_mode;
use super::continuation;
use super::events::{PipelineEvent, PipelineEventKind};
use super::fix_loop::FixLoop;
use super::pipeline::{PipelineMachine, Stage, TaskStatus};
use super::scheduler::TaskRequest;

/// Result of a stage that did not raise an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Verification ran and left these tests failing
    TestsFailed(Vec<TestRecord>),
}

impl From<VerificationOutput> for StageOutcome {
    fn from(output: VerificationOutput) -> Self {
        let failing = output.failing();
        if failing.is_empty() {
            StageOutcome::Completed
        } else {
            StageOutcome::TestsFailed(failing)
        }
    }
}

/// Pipeline runner shared by every task
pub struct Coordinator {
    invoker: AgentInvoker,
    config: Arc<PipelineConfig>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    store: Option<Arc<TaskStore>>,
}

impl Coordinator {
    pub fn new(invoker: AgentInvoker, config: Arc<PipelineConfig>) -> Self {
        Self {
            invoker,
            config,
            event_tx: None,
            store: None,
        }
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Persist every terminal report to the task history
    pub fn with_store(mut self, store: Arc<TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Option<&Arc<TaskStore>> {
        self.store.as_ref()
    }

    /// Emit an event
    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Emit without waiting; dropped if the channel is full
    pub(crate) fn notify(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }

    /// Build the initial state for a request. The mode is fixed here.
    pub fn prepare(&self, request: TaskRequest) -> PipelineState {
        let mode = resolve_mode(request.mode, &self.config, &request.prompt);
        let mut state = PipelineState::new(
            uuid::Uuid::new_v4().to_string(),
            request.prompt,
            request
                .workspace
                .unwrap_or_else(|| self.config.workspace_root.clone()),
            request.model.unwrap_or(self.config.default_model),
            mode,
        );
        state.skills_context = request.skills_context;
        if let Some(previous) = request.previous {
            continuation::attach(&mut state, previous);
        }
        state
    }

    /// Run a task to its terminal report. Never returns early: every failure
    /// ends up in the report.
    #[tracing::instrument(skip(self, state), fields(task_id = %state.task_id, mode = %state.mode))]
    pub async fn run(&self, mut state: PipelineState) -> TaskReport {
        let ctx = SkillContext::new(&self.invoker, &self.config);
        let mut machine = PipelineMachine::new(state.mode, state.is_continuation());
        let mut fix_loop = FixLoop::new(self.config.max_fix_iterations);
        let mut failure: Option<TaskFailure> = None;

        tracing::info!(continuation = state.is_continuation(), "Task started");
        self.emit(PipelineEvent::new(PipelineEventKind::TaskStarted, &state.task_id).with_mode(state.mode))
            .await;

        let mut status = machine.start();
        while let TaskStatus::Running(stage) = status {
            self.emit(PipelineEvent::new(PipelineEventKind::StageStarted, &state.task_id).with_stage(stage))
                .await;

            let started_at = Utc::now();
            let clock = Instant::now();
            let result = self.execute(stage, &mut state, &ctx, &fix_loop).await;
            let elapsed = clock.elapsed();

            status = match result {
                Ok(StageOutcome::Completed) => {
                    tracing::info!(stage = %stage, duration_ms = elapsed.as_millis() as u64, "Stage completed");
                    state.record(StageRecord::succeeded(stage, started_at, elapsed));
                    self.emit(
                        PipelineEvent::new(PipelineEventKind::StageCompleted, &state.task_id)
                            .with_stage(stage),
                    )
                    .await;
                    machine.advance()
                }
                Ok(StageOutcome::TestsFailed(failing)) => {
                    tracing::warn!(stage = %stage, failing = failing.len(), "Tests failing");
                    state.record(StageRecord::failed(
                        stage,
                        started_at,
                        elapsed,
                        format!("{} failing test(s)", failing.len()),
                    ));
                    fix_loop.record(&failing);

                    let next = machine.tests_failed(&mut fix_loop);
                    if next == TaskStatus::Failed {
                        failure = Some(Self::failure(Some(stage), &fix_loop.exhausted()));
                    } else {
                        self.emit(
                            PipelineEvent::new(PipelineEventKind::FixIterationStarted, &state.task_id)
                                .with_stage(Stage::Fixing)
                                .with_data(serde_json::json!({
                                    "iteration": fix_loop.iterations(),
                                    "max_iterations": fix_loop.max_iterations(),
                                    "failing": failing.len(),
                                })),
                        )
                        .await;
                    }
                    next
                }
                Err(err) => {
                    tracing::error!(stage = %stage, error = %err, "Stage failed");
                    state.record(StageRecord::failed(stage, started_at, elapsed, err.to_string()));
                    self.emit(
                        PipelineEvent::new(PipelineEventKind::StageFailed, &state.task_id)
                            .with_stage(stage)
                            .with_data(serde_json::json!({ "error": err.to_string() })),
                    )
                    .await;
                    failure = Some(Self::failure(Some(stage), &err));
                    machine.fail()
                }
            };
        }

        let report = TaskReport::from_state(state, machine.status(), failure);

        if let Some(store) = &self.store {
            let store = store.clone();
            let snapshot = report.clone();
            match tokio::task::spawn_blocking(move || store.save_report(&snapshot)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Failed to save task report: {}", e),
                Err(e) => tracing::warn!("Task report save did not finish: {}", e),
            }
        }

        let kind = if report.succeeded() {
            PipelineEventKind::TaskSucceeded
        } else {
            PipelineEventKind::TaskFailed
        };
        self.emit(PipelineEvent::new(kind, &report.task_id).with_mode(report.mode))
            .await;
        tracing::info!(succeeded = report.succeeded(), stages = report.stages.len(), "Task finished");

        report
    }

    async fn execute(
        &self,
        stage: Stage,
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
        fix_loop: &FixLoop,
    ) -> Result<StageOutcome, StageError> {
        match stage {
            Stage::Locating => LocatorSkill::run(state, ctx).await.map(|_| StageOutcome::Completed),
            Stage::Planning => PlannerSkill::run(state, ctx).await.map(|_| StageOutcome::Completed),
            Stage::Implementing => ImplementerSkill::run(state, ctx)
                .await
                .map(|_| StageOutcome::Completed),
            Stage::Verifying => VerifierSkill::run(state, ctx).await.map(StageOutcome::from),
            Stage::Fixing => FixerSkill::run(state, ctx, fix_loop)
                .await
                .map(StageOutcome::from),
            Stage::Finalizing => FinalizerSkill::run(state, ctx)
                .await
                .map(|_| StageOutcome::Completed),
            Stage::FastDev => FastDevSkill::run(state, ctx).await.map(|_| StageOutcome::Completed),
            Stage::FastFinish => FastFinishSkill::run(state, ctx)
                .await
                .map(|_| StageOutcome::Completed),
            Stage::Simple => SimpleSkill::run(state, ctx).await.map(|_| StageOutcome::Completed),
        }
    }

    fn failure(stage: Option<Stage>, err: &StageError) -> TaskFailure {
        TaskFailure {
            stage,
            kind: err.kind().to_string(),
            error: err.to_string(),
            failing_tests: err.failing_tests().to_vec(),
        }
    }
}
