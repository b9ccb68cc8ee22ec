//! # Pipeline Stages
//!
//! Defines the stages of a task pipeline and the transition table between them.
//!
//! ```text
//! full:      Locating → Planning → Implementing → Verifying ⟶ Fixing* → Finalizing
//! fast:      FastDev → FastFinish
//! simple:    Simple
//! continue:  (full mode) Implementing → Verifying ⟶ Fixing* → Finalizing
//! ```

use super::fix_loop::FixLoop;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Finding the files relevant to the prompt
    Locating,
    /// Producing a change plan
    Planning,
    /// Applying the plan
    Implementing,
    /// Running the tests
    Verifying,
    /// One fix pass followed by re-verification
    Fixing,
    /// Committing the result
    Finalizing,
    /// Compressed implement + self-check for low-complexity prompts
    FastDev,
    /// Compressed finalize for fast mode
    FastFinish,
    /// Single-shot stage replacing the whole pipeline
    Simple,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locating => "locating",
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Verifying => "verifying",
            Self::Fixing => "fixing",
            Self::Finalizing => "finalizing",
            Self::FastDev => "fast_dev",
            Self::FastFinish => "fast_finish",
            Self::Simple => "simple",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locating" => Ok(Self::Locating),
            "planning" => Ok(Self::Planning),
            "implementing" => Ok(Self::Implementing),
            "verifying" => Ok(Self::Verifying),
            "fixing" => Ok(Self::Fixing),
            "finalizing" => Ok(Self::Finalizing),
            "fast_dev" => Ok(Self::FastDev),
            "fast_finish" => Ok(Self::FastFinish),
            "simple" => Ok(Self::Simple),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Which stage order a task runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    #[default]
    Full,
    Fast,
    Simple,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Fast => "fast",
            Self::Simple => "simple",
        }
    }

    /// Fixed stage order for this mode. Fixing is entered only on test failure.
    pub fn stage_order(&self, continuing: bool) -> &'static [Stage] {
        match (self, continuing) {
            (Self::Full, false) => &[
                Stage::Locating,
                Stage::Planning,
                Stage::Implementing,
                Stage::Verifying,
                Stage::Finalizing,
            ],
            (Self::Full, true) => &[Stage::Implementing, Stage::Verifying, Stage::Finalizing],
            (Self::Fast, _) => &[Stage::FastDev, Stage::FastFinish],
            (Self::Simple, _) => &[Stage::Simple],
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "fast" => Ok(Self::Fast),
            "simple" => Ok(Self::Simple),
            other => Err(format!("unknown mode '{}' (expected full, fast or simple)", other)),
        }
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "stage", rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running(Stage),
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The pipeline state machine
///
/// Pure transition logic: it never calls the agent. The coordinator drives it
/// with the outcome of each stage.
#[derive(Debug, Clone)]
pub struct PipelineMachine {
    mode: PipelineMode,
    continuing: bool,
    status: TaskStatus,
}

impl PipelineMachine {
    pub fn new(mode: PipelineMode, continuing: bool) -> Self {
        Self {
            mode,
            continuing,
            status: TaskStatus::Queued,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    fn order(&self) -> &'static [Stage] {
        self.mode.stage_order(self.continuing)
    }

    /// Leave `Queued` and enter the first stage
    pub fn start(&mut self) -> TaskStatus {
        if self.status == TaskStatus::Queued {
            self.status = TaskStatus::Running(self.order()[0]);
        }
        self.status
    }

    /// The current stage succeeded: move to the next stage in the fixed order
    pub fn advance(&mut self) -> TaskStatus {
        self.status = match self.status {
            TaskStatus::Running(Stage::Fixing) => {
                // A passing fix pass resumes right after Verifying.
                self.next_after(Stage::Verifying)
            }
            TaskStatus::Running(stage) => self.next_after(stage),
            other => other,
        };
        self.status
    }

    /// Verifying (or a fix pass) left failing tests
    ///
    /// Returns `Running(Fixing)` while the fix loop has budget, `Failed` otherwise.
    pub fn tests_failed(&mut self, fix_loop: &mut FixLoop) -> TaskStatus {
        self.status = match self.status {
            TaskStatus::Running(Stage::Verifying) | TaskStatus::Running(Stage::Fixing) => {
                if fix_loop.begin_iteration() {
                    TaskStatus::Running(Stage::Fixing)
                } else {
                    TaskStatus::Failed
                }
            }
            // Only verification produces test results.
            TaskStatus::Running(_) => TaskStatus::Failed,
            other => other,
        };
        self.status
    }

    /// The current stage raised an error
    pub fn fail(&mut self) -> TaskStatus {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Failed;
        }
        self.status
    }

    fn next_after(&self, stage: Stage) -> TaskStatus {
        let order = self.order();
        match order.iter().position(|s| *s == stage) {
            Some(index) if index + 1 < order.len() => TaskStatus::Running(order[index + 1]),
            Some(_) => TaskStatus::Succeeded,
            None => TaskStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(machine: &mut PipelineMachine) -> Vec<Stage> {
        let mut seen = Vec::new();
        let mut status = machine.start();
        while let TaskStatus::Running(stage) = status {
            seen.push(stage);
            status = machine.advance();
        }
        seen
    }

    #[test]
    fn test_full_pipeline_advance() {
        let mut machine = PipelineMachine::new(PipelineMode::Full, false);
        assert_eq!(machine.status(), TaskStatus::Queued);
        assert_eq!(
            walk(&mut machine),
            vec![
                Stage::Locating,
                Stage::Planning,
                Stage::Implementing,
                Stage::Verifying,
                Stage::Finalizing
            ]
        );
        assert_eq!(machine.status(), TaskStatus::Succeeded);
    }

    #[test]
    fn test_fast_and_simple_orders() {
        let mut fast = PipelineMachine::new(PipelineMode::Fast, false);
        assert_eq!(walk(&mut fast), vec![Stage::FastDev, Stage::FastFinish]);

        let mut simple = PipelineMachine::new(PipelineMode::Simple, false);
        assert_eq!(walk(&mut simple), vec![Stage::Simple]);
    }

    #[test]
    fn test_continuation_skips_locating_and_planning() {
        let mut machine = PipelineMachine::new(PipelineMode::Full, true);
        let stages = walk(&mut machine);
        assert_eq!(stages[0], Stage::Implementing);
        assert!(!stages.contains(&Stage::Locating));
        assert!(!stages.contains(&Stage::Planning));
    }

    #[test]
    fn test_fix_loop_bound() {
        let mut machine = PipelineMachine::new(PipelineMode::Full, false);
        let mut fix_loop = FixLoop::new(2);
        machine.start();
        machine.advance(); // planning
        machine.advance(); // implementing
        assert_eq!(machine.advance(), TaskStatus::Running(Stage::Verifying));

        assert_eq!(
            machine.tests_failed(&mut fix_loop),
            TaskStatus::Running(Stage::Fixing)
        );
        assert_eq!(
            machine.tests_failed(&mut fix_loop),
            TaskStatus::Running(Stage::Fixing)
        );
        assert_eq!(machine.tests_failed(&mut fix_loop), TaskStatus::Failed);
        assert_eq!(fix_loop.iterations(), 2);
        assert_eq!(machine.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_passing_fix_resumes_at_finalizing() {
        let mut machine = PipelineMachine::new(PipelineMode::Full, true);
        machine.start();
        machine.advance();
        machine.tests_failed(&mut FixLoop::new(3));
        assert_eq!(machine.advance(), TaskStatus::Running(Stage::Finalizing));
        assert_eq!(machine.advance(), TaskStatus::Succeeded);
    }

    #[test]
    fn test_zero_fix_budget_fails_immediately() {
        let mut machine = PipelineMachine::new(PipelineMode::Full, true);
        machine.start();
        machine.advance();
        assert_eq!(machine.tests_failed(&mut FixLoop::new(0)), TaskStatus::Failed);
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut machine = PipelineMachine::new(PipelineMode::Fast, false);
        machine.start();
        assert_eq!(machine.fail(), TaskStatus::Failed);
        assert_eq!(machine.advance(), TaskStatus::Failed);
        assert!(machine.status().is_terminal());
    }

    #[test]
    fn test_stage_round_trips_through_str() {
        for stage in [Stage::Locating, Stage::Fixing, Stage::FastFinish, Stage::Simple] {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!("FAST".parse::<PipelineMode>().unwrap(), PipelineMode::Fast);
    }
}
