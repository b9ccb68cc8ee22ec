//! # Locator Skill
//!
//! Finds the files relevant to the prompt. The agent gets a candidate listing
//! of the workspace (gitignore-aware) so it does not have to walk the tree itself.

use super::SkillContext;
use crate::agent::AgentOutput;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::{LocatedFile, PipelineState};
use crate::swarm::pipeline::Stage;
use crate::tools::workspace::{self, WorkspaceListing};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MAX_TURNS: u32 = 10;

/// Upper bound on the candidate listing put in the prompt
const CANDIDATE_LIMIT: usize = 400;

/// Output from the locator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LocatorOutput {
    /// Files relevant to the task, most important first
    pub files: Vec<LocatedFile>,
    /// One-paragraph overview of where the change lives
    pub summary: String,
}

impl AgentOutput for LocatorOutput {
    fn validate(&self) -> Result<(), String> {
        if self.files.iter().any(|f| f.path.trim().is_empty()) {
            return Err("located file with an empty path".to_string());
        }
        Ok(())
    }
}

pub struct LocatorSkill;

impl LocatorSkill {
    pub fn build_prompt(state: &PipelineState, candidates: &WorkspaceListing) -> String {
        let mut prompt = format!("## Task\n\n{}\n\n## Candidate files\n\n", state.prompt.trim());
        if candidates.files.is_empty() {
            prompt.push_str("(the workspace has no tracked files yet)\n");
        }
        for path in &candidates.files {
            prompt.push_str(path);
            prompt.push('\n');
        }
        if candidates.truncated {
            prompt.push_str("(listing truncated; search the tree for anything missing)\n");
        }
        prompt
    }

    /// List the workspace, ask the agent to pick the relevant files and
    /// record them on the task.
    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
    ) -> Result<LocatorOutput, StageError> {
        let candidates = workspace::list_files(&state.workspace, CANDIDATE_LIMIT)
            .await
            .map_err(|e| StageError::Tool {
                stage: Stage::Locating,
                reason: e.to_string(),
            })?;

        let prompt = Self::build_prompt(state, &candidates);
        let request = ctx.request(state, Stage::Locating, prompt, AgentTool::READ_ONLY, MAX_TURNS);
        let invocation = ctx.invoke::<LocatorOutput>(request).await?;

        state.sessions.set(Stage::Locating, invocation.session_id);
        state.relevant_files = invocation.parsed.files.clone();

        tracing::info!(
            task_id = %state.task_id,
            files = state.relevant_files.len(),
            "Located relevant files"
        );
        Ok(invocation.parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentModel;
    use crate::swarm::pipeline::PipelineMode;

    #[test]
    fn test_prompt_lists_candidates() {
        let state = PipelineState::new("t", "Add a health check", ".", AgentModel::Sonnet, PipelineMode::Full);
        let mut listing = WorkspaceListing {
            files: vec!["src/main.rs".to_string(), "src/routes.rs".to_string()],
            truncated: false,
        };
        let prompt = LocatorSkill::build_prompt(&state, &listing);
        assert!(prompt.contains("Add a health check"));
        assert!(prompt.contains("src/routes.rs\n"));
        assert!(!prompt.contains("truncated"));

        listing.truncated = true;
        assert!(LocatorSkill::build_prompt(&state, &listing).contains("listing truncated"));
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let output = LocatorOutput {
            files: vec![LocatedFile {
                path: " ".to_string(),
                reason: "?".to_string(),
            }],
            summary: String::new(),
        };
        assert!(output.validate().is_err());
    }
}
