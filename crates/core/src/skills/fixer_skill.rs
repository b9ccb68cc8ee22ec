//! # Fixer Skill
//!
//! One fix cycle: a code-writing pass that sees every failure recorded so far,
//! followed by a fresh verification. Both calls belong to a single Fixing stage.

use super::implementer_skill::{apply_changes, ImplementationOutput, ImplementerSkill};
use super::verifier_skill::{VerificationOutput, VerifierSkill};
use super::SkillContext;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::PipelineState;
use crate::swarm::fix_loop::FixLoop;
use crate::swarm::pipeline::Stage;

pub const MAX_TURNS: u32 = 40;

pub struct FixerSkill;

impl FixerSkill {
    /// The implementer prompt plus the accumulated failures
    pub fn build_prompt(state: &PipelineState, fix_loop: &FixLoop) -> Result<String, StageError> {
        let mut prompt = ImplementerSkill::build_prompt(state)?;
        prompt.push_str(&format!(
            "\n## Failing tests (fix attempt {} of {})\n\n\
             Verification failed after the changes above. Make these tests pass:\n\n{}\n",
            fix_loop.iterations(),
            fix_loop.max_iterations(),
            fix_loop.failure_summary()
        ));
        Ok(prompt)
    }

    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
        fix_loop: &FixLoop,
    ) -> Result<VerificationOutput, StageError> {
        let prompt = Self::build_prompt(state, fix_loop)?;
        let mut request = ctx.request(state, Stage::Fixing, prompt, AgentTool::ALL, MAX_TURNS);
        // Keep the conversation that wrote the failing code.
        request.resume_session = state.sessions.latest_code_session().map(String::from);

        let invocation = ctx.invoke::<ImplementationOutput>(request).await?;
        apply_changes(state, Stage::Fixing, invocation);

        VerifierSkill::run(state, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentModel;
    use crate::state::{Plan, PlanStep, TestRecord};
    use crate::swarm::pipeline::PipelineMode;

    #[test]
    fn test_prompt_carries_every_failure() {
        let mut state =
            PipelineState::new("t", "Add greet()", ".", AgentModel::Sonnet, PipelineMode::Full);
        state.plan = Some(Plan {
            summary: "greet".to_string(),
            steps: vec![PlanStep {
                file: "src/lib.rs".to_string(),
                description: "add greet()".to_string(),
            }],
        });

        let mut fix_loop = FixLoop::new(3);
        fix_loop.record(&[TestRecord::failed("tests/greet.rs", "greets", "expected hello")]);
        fix_loop.begin_iteration();
        fix_loop.record(&[TestRecord::failed("tests/greet.rs", "shouts", "expected HELLO")]);
        fix_loop.begin_iteration();

        let prompt = FixerSkill::build_prompt(&state, &fix_loop).unwrap();
        assert!(prompt.contains("1. src/lib.rs: add greet()"));
        assert!(prompt.contains("fix attempt 2 of 3"));
        assert!(prompt.contains("tests/greet.rs::greets: expected hello"));
        assert!(prompt.contains("tests/greet.rs::shouts: expected HELLO"));
    }
}
