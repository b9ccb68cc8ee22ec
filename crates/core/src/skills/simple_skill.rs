//! Single-shot stage for questions and trivial edits.

use super::implementer_skill::{
    apply_changes, continued_session, task_section, ImplementationOutput,
};
use super::SkillContext;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::PipelineState;
use crate::swarm::pipeline::Stage;

pub const MAX_TURNS: u32 = 30;

pub struct SimpleSkill;

impl SimpleSkill {
    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
    ) -> Result<ImplementationOutput, StageError> {
        let prompt = task_section(state);
        let mut request = ctx.request(state, Stage::Simple, prompt, AgentTool::ALL, MAX_TURNS);
        request.resume_session = continued_session(state);

        let invocation = ctx.invoke::<ImplementationOutput>(request).await?;
        Ok(apply_changes(state, Stage::Simple, invocation))
    }
}
