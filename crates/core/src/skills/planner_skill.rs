//! # Planner Skill
//!
//! Turns the prompt and the located files into a per-file change plan.

use super::SkillContext;
use crate::agent::AgentOutput;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::{PipelineState, Plan};
use crate::swarm::pipeline::Stage;

pub const MAX_TURNS: u32 = 15;

impl AgentOutput for Plan {
    fn validate(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("plan has no steps".to_string());
        }
        if let Some(step) = self.steps.iter().find(|s| s.file.trim().is_empty()) {
            return Err(format!("plan step without a file: {}", step.description));
        }
        Ok(())
    }
}

pub struct PlannerSkill;

impl PlannerSkill {
    pub fn build_prompt(state: &PipelineState) -> String {
        let mut prompt = format!("## Task\n\n{}\n", state.prompt.trim());
        if !state.relevant_files.is_empty() {
            prompt.push_str("\n## Relevant files\n\n");
            for file in &state.relevant_files {
                prompt.push_str(&format!("- {}: {}\n", file.path, file.reason));
            }
        }
        prompt
    }

    pub async fn run(state: &mut PipelineState, ctx: &SkillContext<'_>) -> Result<Plan, StageError> {
        let prompt = Self::build_prompt(state);
        let request = ctx.request(state, Stage::Planning, prompt, AgentTool::READ_ONLY, MAX_TURNS);
        let invocation = ctx.invoke::<Plan>(request).await?;

        state.sessions.set(Stage::Planning, invocation.session_id);
        state.plan = Some(invocation.parsed.clone());

        tracing::info!(
            task_id = %state.task_id,
            steps = invocation.parsed.steps.len(),
            "Plan ready"
        );
        Ok(invocation.parsed)
    }
}
