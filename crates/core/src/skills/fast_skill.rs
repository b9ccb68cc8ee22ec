//! # Fast Skills
//!
//! Compressed path for low-complexity prompts: FastDev implements and
//! self-checks in one call, FastFinish commits.

use super::finalizer_skill::{finalize, FinalizeOutput};
use super::implementer_skill::{
    apply_changes, continued_session, task_section, ImplementationOutput,
};
use super::SkillContext;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::PipelineState;
use crate::swarm::pipeline::Stage;

pub const DEV_MAX_TURNS: u32 = 40;
pub const FINISH_MAX_TURNS: u32 = 10;

pub struct FastDevSkill;

impl FastDevSkill {
    pub fn build_prompt(state: &PipelineState) -> String {
        format!(
            "{}\nThere is no separate planning or verification stage. Make the change, \
             then run the most relevant tests or a build and fix what they reveal.\n",
            task_section(state)
        )
    }

    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
    ) -> Result<ImplementationOutput, StageError> {
        let prompt = Self::build_prompt(state);
        let mut request = ctx.request(state, Stage::FastDev, prompt, AgentTool::ALL, DEV_MAX_TURNS);
        request.resume_session = continued_session(state);

        let invocation = ctx.invoke::<ImplementationOutput>(request).await?;
        Ok(apply_changes(state, Stage::FastDev, invocation))
    }
}

pub struct FastFinishSkill;

impl FastFinishSkill {
    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
    ) -> Result<FinalizeOutput, StageError> {
        finalize(state, ctx, Stage::FastFinish, FINISH_MAX_TURNS).await
    }
}
