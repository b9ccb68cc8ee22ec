//! # Implementer Skill
//!
//! Applies the plan. On a continuation it works from the previous task's
//! change list instead, and resumes that task's code-writing conversation.
//!
//! `ImplementationOutput` is shared by every code-writing stage (Fixing,
//! FastDev and Simple reply with the same shape).

use super::SkillContext;
use crate::agent::{AgentOutput, Invocation};
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::{ChangeRecord, PipelineState};
use crate::swarm::continuation;
use crate::swarm::pipeline::Stage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MAX_TURNS: u32 = 50;

/// Output from any code-writing stage
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImplementationOutput {
    /// One entry per file touched
    pub changes: Vec<ChangeRecord>,
    pub summary: String,
}

impl AgentOutput for ImplementationOutput {
    fn validate(&self) -> Result<(), String> {
        if self.changes.iter().any(|c| c.file.trim().is_empty()) {
            return Err("change record with an empty file path".to_string());
        }
        Ok(())
    }
}

/// Task header: the continuation prompt when resuming, the plain prompt otherwise
pub(crate) fn task_section(state: &PipelineState) -> String {
    match &state.previous {
        Some(previous) => continuation::build_continuation_prompt(&state.prompt, previous),
        None => format!("## Task\n\n{}\n", state.prompt.trim()),
    }
}

/// Session a first code-writing stage resumes, if continuing
pub(crate) fn continued_session(state: &PipelineState) -> Option<String> {
    state
        .previous
        .as_ref()
        .and_then(continuation::resume_session)
}

/// Store the session and append the reported changes
pub(crate) fn apply_changes(
    state: &mut PipelineState,
    stage: Stage,
    invocation: Invocation<ImplementationOutput>,
) -> ImplementationOutput {
    state.sessions.set(stage, invocation.session_id);
    state.changes.extend(invocation.parsed.changes.iter().cloned());
    tracing::info!(
        task_id = %state.task_id,
        stage = %stage,
        changes = invocation.parsed.changes.len(),
        "Changes applied"
    );
    invocation.parsed
}

pub struct ImplementerSkill;

impl ImplementerSkill {
    /// Fails with `MissingPlan` when there is neither a plan nor a previous task
    pub fn build_prompt(state: &PipelineState) -> Result<String, StageError> {
        if state.plan.is_none() && state.previous.is_none() {
            return Err(StageError::MissingPlan);
        }

        let mut prompt = task_section(state);
        if let Some(plan) = &state.plan {
            prompt.push_str("\n## Plan\n\n");
            prompt.push_str(&plan.render());
        }
        if !state.relevant_files.is_empty() {
            prompt.push_str("\n## Relevant files\n\n");
            for file in &state.relevant_files {
                prompt.push_str(&format!("- {}\n", file.path));
            }
        }
        Ok(prompt)
    }

    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
    ) -> Result<ImplementationOutput, StageError> {
        let prompt = Self::build_prompt(state)?;
        let mut request = ctx.request(state, Stage::Implementing, prompt, AgentTool::ALL, MAX_TURNS);
        request.resume_session = continued_session(state);

        let invocation = ctx.invoke::<ImplementationOutput>(request).await?;
        Ok(apply_changes(state, Stage::Implementing, invocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentModel;
    use crate::state::{ChangeAction, Plan, PlanStep, PreviousTaskContext, SessionIds};
    use crate::swarm::pipeline::PipelineMode;

    fn state() -> PipelineState {
        PipelineState::new("t", "Add greet()", ".", AgentModel::Sonnet, PipelineMode::Full)
    }

    #[test]
    fn test_missing_plan() {
        let err = ImplementerSkill::build_prompt(&state()).unwrap_err();
        assert!(matches!(err, StageError::MissingPlan));
    }

    #[test]
    fn test_prompt_includes_plan() {
        let mut state = state();
        state.plan = Some(Plan {
            summary: "Add a greeting".to_string(),
            steps: vec![PlanStep {
                file: "src/lib.rs".to_string(),
                description: "add greet()".to_string(),
            }],
        });
        let prompt = ImplementerSkill::build_prompt(&state).unwrap();
        assert!(prompt.starts_with("## Task"));
        assert!(prompt.contains("1. src/lib.rs: add greet()"));
    }

    #[test]
    fn test_continuation_needs_no_plan() {
        let mut state = state();
        let mut sessions = SessionIds::default();
        sessions.set(Stage::Implementing, "impl-prev");
        state.previous = Some(PreviousTaskContext {
            task_id: "prev".to_string(),
            changes: vec![ChangeRecord::new("a.ts", ChangeAction::Modified, "fix bug")],
            sessions,
        });

        let prompt = ImplementerSkill::build_prompt(&state).unwrap();
        assert!(prompt.contains("a.ts (modified): fix bug"));
        assert_eq!(continued_session(&state).as_deref(), Some("impl-prev"));
    }

    #[test]
    fn test_output_shape() {
        let json = r#"{"changes": [{"file": "a.ts", "action": "deleted", "summary": "dead"}], "summary": "s"}"#;
        let output: ImplementationOutput = serde_json::from_str(json).unwrap();
        assert_eq!(output.changes[0].action, ChangeAction::Deleted);
        assert!(output.validate().is_ok());
    }
}
