//! # Stage Skills
//!
//! One skill per pipeline stage. Each skill builds its prompt from the task
//! state, invokes the agent with its own tool allow-list, turn budget and
//! result shape, then folds the parsed result back into the state.
//!
//! ```text
//! Coordinator
//!   └── Skill::run(&mut PipelineState, &SkillContext)
//!         └── AgentInvoker::invoke::<Output>(AgentRequest)
//! ```
//!
//! ## Skills
//!
//! | Stage | Skill | Tools | Turns |
//! |-------|-------|-------|-------|
//! | Locating | `LocatorSkill` | read-only | 10 |
//! | Planning | `PlannerSkill` | read-only | 15 |
//! | Implementing | `ImplementerSkill` | all | 50 |
//! | Verifying | `VerifierSkill` | read + execute | 30 |
//! | Fixing | `FixerSkill` | all, then read + execute | 40 / 30 |
//! | Finalizing | `FinalizerSkill` | read + bash | 10 |
//! | FastDev | `FastDevSkill` | all | 40 |
//! | FastFinish | `FastFinishSkill` | read + bash | 10 |
//! | Simple | `SimpleSkill` | all | 30 |
//!
//! Timing and `StageRecord`s belong to the coordinator, not the skills.

pub mod prompts;

pub mod fast_skill;
pub mod finalizer_skill;
pub mod fixer_skill;
pub mod implementer_skill;
pub mod locator_skill;
pub mod planner_skill;
pub mod simple_skill;
pub mod verifier_skill;

pub use fast_skill::{FastDevSkill, FastFinishSkill};
pub use finalizer_skill::{FinalizeOutput, FinalizerSkill};
pub use fixer_skill::FixerSkill;
pub use implementer_skill::{ImplementationOutput, ImplementerSkill};
pub use locator_skill::{LocatorOutput, LocatorSkill};
pub use planner_skill::PlannerSkill;
pub use simple_skill::SimpleSkill;
pub use verifier_skill::{VerificationOutput, VerifierSkill};

use crate::agent::{build_system_prompt, AgentInvoker, AgentOutput, AgentRequest, Invocation};
use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::PipelineState;
use crate::swarm::pipeline::Stage;

/// Shared handles every skill runs with
#[derive(Clone, Copy)]
pub struct SkillContext<'a> {
    pub invoker: &'a AgentInvoker,
    pub config: &'a PipelineConfig,
}

impl<'a> SkillContext<'a> {
    pub fn new(invoker: &'a AgentInvoker, config: &'a PipelineConfig) -> Self {
        Self { invoker, config }
    }

    /// Request for `stage` with the stage's system prompt and model
    pub(crate) fn request(
        &self,
        state: &PipelineState,
        stage: Stage,
        prompt: String,
        tools: &[AgentTool],
        max_turns: u32,
    ) -> AgentRequest {
        AgentRequest {
            stage,
            prompt,
            system_prompt: build_system_prompt(
                prompts::for_stage(stage),
                state.skills_context.as_deref(),
            ),
            allowed_tools: tools.to_vec(),
            model: self.config.model_for(stage, state.model),
            max_turns,
            workspace: state.workspace.clone(),
            resume_session: None,
        }
    }

    /// Invoke and attribute any failure to `request.stage`
    pub(crate) async fn invoke<T: AgentOutput>(
        &self,
        request: AgentRequest,
    ) -> Result<Invocation<T>, StageError> {
        let stage = request.stage;
        self.invoker
            .invoke::<T>(request)
            .await
            .map_err(|e| StageError::from_agent(stage, e))
    }
}
