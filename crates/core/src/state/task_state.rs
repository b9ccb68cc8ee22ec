//! # Task State
//!
//! Per-task pipeline state and the records it accumulates.
//! A `PipelineState` is owned by exactly one running task; stages mutate it
//! one at a time and nothing else holds a reference to it.

use crate::models::AgentModel;
use crate::swarm::pipeline::{PipelineMode, Stage, TaskStatus};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Modified,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown change action '{}'", other)),
        }
    }
}

/// One file touched by a code-writing stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeRecord {
    /// Path relative to the workspace root
    pub file: String,
    pub action: ChangeAction,
    /// Free-text description of the change
    pub summary: String,
}

impl ChangeRecord {
    pub fn new(file: impl Into<String>, action: ChangeAction, summary: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            action,
            summary: summary.into(),
        }
    }

    /// `file (action): summary`
    pub fn render_line(&self) -> String {
        format!("{} ({}): {}", self.file, self.action, self.summary)
    }
}

/// Outcome of a single test from the Verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TestRecord {
    pub test_file: String,
    pub test_name: String,
    pub passed: bool,
    /// Preferred (not required) when `passed` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TestRecord {
    pub fn passed(test_file: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            test_file: test_file.into(),
            test_name: test_name.into(),
            passed: true,
            error_message: None,
        }
    }

    pub fn failed(
        test_file: impl Into<String>,
        test_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            test_file: test_file.into(),
            test_name: test_name.into(),
            passed: false,
            error_message: Some(error.into()),
        }
    }

    /// One-line summary used in fix prompts and reports
    pub fn summary_line(&self) -> String {
        match self.error_message.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(message) => format!("{}::{}: {}", self.test_file, self.test_name, message),
            None => format!("{}::{}: failed", self.test_file, self.test_name),
        }
    }
}

/// A file the Locator considers relevant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocatedFile {
    pub path: String,
    /// Why this file matters for the prompt
    pub reason: String,
}

/// One step of the change plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub file: String,
    pub description: String,
}

/// The Planner's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub summary: String,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.summary);
        for (index, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("{}. {}: {}\n", index + 1, step.file, step.description));
        }
        out
    }
}

/// Result of the finalize stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub committed: bool,
    pub message: String,
    /// Commit id reported by the agent, or read back from HEAD
    pub sha: Option<String>,
}

/// Agent session id per stage
///
/// One explicit slot per stage rather than a string-keyed map, so the
/// continuation contract is checked by the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIds {
    pub locating: Option<String>,
    pub planning: Option<String>,
    pub implementing: Option<String>,
    pub verifying: Option<String>,
    pub fixing: Option<String>,
    pub finalizing: Option<String>,
    pub fast_dev: Option<String>,
    pub fast_finish: Option<String>,
    pub simple: Option<String>,
}

impl SessionIds {
    fn slot_mut(&mut self, stage: Stage) -> &mut Option<String> {
        match stage {
            Stage::Locating => &mut self.locating,
            Stage::Planning => &mut self.planning,
            Stage::Implementing => &mut self.implementing,
            Stage::Verifying => &mut self.verifying,
            Stage::Fixing => &mut self.fixing,
            Stage::Finalizing => &mut self.finalizing,
            Stage::FastDev => &mut self.fast_dev,
            Stage::FastFinish => &mut self.fast_finish,
            Stage::Simple => &mut self.simple,
        }
    }

    pub fn get(&self, stage: Stage) -> Option<&str> {
        let slot = match stage {
            Stage::Locating => &self.locating,
            Stage::Planning => &self.planning,
            Stage::Implementing => &self.implementing,
            Stage::Verifying => &self.verifying,
            Stage::Fixing => &self.fixing,
            Stage::Finalizing => &self.finalizing,
            Stage::FastDev => &self.fast_dev,
            Stage::FastFinish => &self.fast_finish,
            Stage::Simple => &self.simple,
        };
        slot.as_deref()
    }

    pub fn set(&mut self, stage: Stage, session_id: impl Into<String>) {
        *self.slot_mut(stage) = Some(session_id.into());
    }

    /// Most recent conversation that wrote code, preferring later stages
    pub fn latest_code_session(&self) -> Option<&str> {
        [Stage::Fixing, Stage::Implementing, Stage::FastDev, Stage::Simple]
            .into_iter()
            .find_map(|stage| self.get(stage))
    }

    /// Populated slots in pipeline order
    pub fn entries(&self) -> Vec<(Stage, &str)> {
        [
            Stage::Locating,
            Stage::Planning,
            Stage::Implementing,
            Stage::Verifying,
            Stage::Fixing,
            Stage::Finalizing,
            Stage::FastDev,
            Stage::FastFinish,
            Stage::Simple,
        ]
        .into_iter()
        .filter_map(|stage| self.get(stage).map(|id| (stage, id)))
        .collect()
    }
}

/// Snapshot of a prior task carried into a continuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousTaskContext {
    pub task_id: String,
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub sessions: SessionIds,
}

/// Append-only log entry for one stage attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl StageRecord {
    pub fn succeeded(stage: Stage, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            stage,
            success: true,
            duration_ms: duration.as_millis() as u64,
            error: None,
            started_at,
        }
    }

    pub fn failed(
        stage: Stage,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            success: false,
            duration_ms: duration.as_millis() as u64,
            error: Some(error.into()),
            started_at,
        }
    }
}

/// The machine-readable state of a single task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub task_id: String,
    /// Original user prompt
    pub prompt: String,
    pub workspace: PathBuf,
    pub model: AgentModel,
    /// Set by Planning; `None` until then
    pub plan: Option<Plan>,
    pub mode: PipelineMode,
    pub sessions: SessionIds,
    /// Set only when continuing a prior task
    pub previous: Option<PreviousTaskContext>,
    pub changes: Vec<ChangeRecord>,
    /// Set by Locating
    #[serde(default)]
    pub relevant_files: Vec<LocatedFile>,
    /// Latest verification results
    #[serde(default)]
    pub tests: Vec<TestRecord>,
    /// Set by the finalize stage
    #[serde(default)]
    pub commit: Option<CommitRecord>,
    /// Auxiliary domain hints appended to every system prompt
    #[serde(default)]
    pub skills_context: Option<String>,
    #[serde(default)]
    pub stage_records: Vec<StageRecord>,
}

impl PipelineState {
    pub fn new(
        task_id: impl Into<String>,
        prompt: impl Into<String>,
        workspace: impl Into<PathBuf>,
        model: AgentModel,
        mode: PipelineMode,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            prompt: prompt.into(),
            workspace: workspace.into(),
            model,
            plan: None,
            mode,
            sessions: SessionIds::default(),
            previous: None,
            changes: Vec::new(),
            relevant_files: Vec::new(),
            tests: Vec::new(),
            commit: None,
            skills_context: None,
            stage_records: Vec::new(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.previous.is_some()
    }

    pub fn record(&mut self, record: StageRecord) {
        self.stage_records.push(record);
    }

    /// Stages in execution order
    pub fn executed_stages(&self) -> Vec<Stage> {
        self.stage_records.iter().map(|r| r.stage).collect()
    }
}

/// Why a task failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// `None` when the failure happened before any stage ran
    pub stage: Option<Stage>,
    /// Error kind (see `StageError::kind`)
    pub kind: String,
    pub error: String,
    #[serde(default)]
    pub failing_tests: Vec<TestRecord>,
}

/// Terminal record of a task, sufficient to diagnose it without re-running
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub prompt: String,
    pub mode: PipelineMode,
    pub status: TaskStatus,
    pub stages: Vec<StageRecord>,
    pub changes: Vec<ChangeRecord>,
    pub tests: Vec<TestRecord>,
    pub commit: Option<CommitRecord>,
    pub sessions: SessionIds,
    pub previous_task_id: Option<String>,
    pub failure: Option<TaskFailure>,
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    pub fn from_state(state: PipelineState, status: TaskStatus, failure: Option<TaskFailure>) -> Self {
        Self {
            task_id: state.task_id,
            prompt: state.prompt,
            mode: state.mode,
            status,
            stages: state.stage_records,
            changes: state.changes,
            tests: state.tests,
            commit: state.commit,
            sessions: state.sessions,
            previous_task_id: state.previous.map(|p| p.task_id),
            failure,
            finished_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    pub fn executed_stages(&self) -> Vec<Stage> {
        self.stages.iter().map(|r| r.stage).collect()
    }

    /// Context for a task that continues this one
    pub fn to_previous_context(&self) -> PreviousTaskContext {
        PreviousTaskContext {
            task_id: self.task_id.clone(),
            changes: self.changes.clone(),
            sessions: self.sessions.clone(),
        }
    }
}
