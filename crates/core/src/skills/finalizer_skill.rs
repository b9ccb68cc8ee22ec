//! # Finalizer Skill
//!
//! Commits the change. The agent gets the working-tree status up front, and
//! when it reports a commit without a sha the HEAD commit is read back.

use super::SkillContext;
use crate::agent::AgentOutput;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::{CommitRecord, PipelineState};
use crate::swarm::continuation::render_change_lines;
use crate::swarm::pipeline::Stage;
use crate::tools::git;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MAX_TURNS: u32 = 10;

/// Output from the finalize stages
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FinalizeOutput {
    pub committed: bool,
    pub commit_message: String,
    #[serde(default)]
    pub commit_sha: Option<String>,
}

impl AgentOutput for FinalizeOutput {
    fn validate(&self) -> Result<(), String> {
        if self.committed && self.commit_message.trim().is_empty() {
            return Err("committed without a commit message".to_string());
        }
        Ok(())
    }
}

pub(crate) async fn build_prompt(state: &PipelineState) -> String {
    let mut prompt = format!("## Task\n\n{}\n\n## Changes\n\n", state.prompt.trim());
    if state.changes.is_empty() {
        prompt.push_str("No file changes were recorded.\n");
    } else {
        prompt.push_str(&render_change_lines(&state.changes));
        prompt.push('\n');
    }

    prompt.push_str("\n## Git status\n\n");
    match git::working_tree_status(&state.workspace).await {
        Ok(status) => prompt.push_str(&status.render()),
        Err(e) => {
            tracing::warn!(task_id = %state.task_id, "Git status unavailable: {}", e);
            prompt.push_str(&format!("Unavailable: {}\n", e));
        }
    }
    prompt
}

/// Shared by Finalizing and FastFinish
pub(crate) async fn finalize(
    state: &mut PipelineState,
    ctx: &SkillContext<'_>,
    stage: Stage,
    max_turns: u32,
) -> Result<FinalizeOutput, StageError> {
    let prompt = build_prompt(state).await;
    let request = ctx.request(state, stage, prompt, AgentTool::VCS, max_turns);
    let invocation = ctx.invoke::<FinalizeOutput>(request).await?;
    state.sessions.set(stage, invocation.session_id);

    let output = invocation.parsed;
    let sha = match (&output.commit_sha, output.committed) {
        (Some(sha), _) => Some(sha.clone()),
        (None, true) => match git::head_commit(&state.workspace).await {
            Ok(head) => head,
            Err(e) => {
                tracing::warn!(task_id = %state.task_id, "Could not read HEAD: {}", e);
                None
            }
        },
        (None, false) => None,
    };

    tracing::info!(
        task_id = %state.task_id,
        committed = output.committed,
        sha = sha.as_deref().unwrap_or("-"),
        "Finalized"
    );

    state.commit = Some(CommitRecord {
        committed: output.committed,
        message: output.commit_message.clone(),
        sha,
    });
    Ok(output)
}

pub struct FinalizerSkill;

impl FinalizerSkill {
    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
    ) -> Result<FinalizeOutput, StageError> {
        finalize(state, ctx, Stage::Finalizing, MAX_TURNS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_needs_message() {
        let output = FinalizeOutput {
            committed: true,
            commit_message: " ".to_string(),
            commit_sha: None,
        };
        assert!(output.validate().is_err());

        let nothing = FinalizeOutput {
            committed: false,
            commit_message: String::new(),
            commit_sha: None,
        };
        assert!(nothing.validate().is_ok());
    }

    #[test]
    fn test_sha_is_optional_in_shape() {
        let output: FinalizeOutput =
            serde_json::from_str(r#"{"committed": true, "commit_message": "Add greet"}"#).unwrap();
        assert!(output.commit_sha.is_none());
    }
}
