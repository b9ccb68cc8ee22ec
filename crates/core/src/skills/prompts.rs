//! Default system prompts bundled at compile time, one per stage.

use crate::swarm::pipeline::Stage;

/// Locator - finds the files relevant to the task
pub const LOCATOR: &str = include_str!("defaults/locator.md");

/// Planner - turns the task into per-file steps
pub const PLANNER: &str = include_str!("defaults/planner.md");

/// Implementer - applies the plan
pub const IMPLEMENTER: &str = include_str!("defaults/implementer.md");

/// Verifier - runs the tests, never edits
pub const VERIFIER: &str = include_str!("defaults/verifier.md");

/// Fixer - repairs failing tests
pub const FIXER: &str = include_str!("defaults/fixer.md");

/// Finalizer - commits the change
pub const FINALIZER: &str = include_str!("defaults/finalizer.md");

/// Fast developer - implement and self-check in one pass
pub const FAST_DEV: &str = include_str!("defaults/fast_dev.md");

/// Fast finisher - one-line commit
pub const FAST_FINISH: &str = include_str!("defaults/fast_finish.md");

/// Simple - questions and trivial edits
pub const SIMPLE: &str = include_str!("defaults/simple.md");

/// Base system prompt for a stage
pub fn for_stage(stage: Stage) -> &'static str {
    match stage {
        Stage::Locating => LOCATOR,
        Stage::Planning => PLANNER,
        Stage::Implementing => IMPLEMENTER,
        Stage::Verifying => VERIFIER,
        Stage::Fixing => FIXER,
        Stage::Finalizing => FINALIZER,
        Stage::FastDev => FAST_DEV,
        Stage::FastFinish => FAST_FINISH,
        Stage::Simple => SIMPLE,
    }
}
