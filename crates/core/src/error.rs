//! # Error Taxonomy
//!
//! Typed failures for the agent boundary and for pipeline stages.
//! Verification failures are *not* errors: a failing test set is a normal
//! stage outcome that feeds the fix loop (see `swarm::coordinator::StageOutcome`).

use crate::state::TestRecord;
use crate::swarm::pipeline::Stage;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single agent invocation
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// The call itself failed (spawn, IO, non-zero exit)
    #[error("agent invocation failed: {0}")]
    Invocation(String),

    /// The agent did not answer within the per-invocation deadline
    #[error("agent did not respond within {0:?}")]
    Timeout(Duration),

    /// The agent ran but reported an error result
    #[error("agent reported an error: {0}")]
    AgentReported(String),

    /// The transcript held no JSON object matching the expected shape
    #[error("malformed agent output: {reason}")]
    MalformedOutput { reason: String, excerpt: String },
}

impl AgentError {
    pub(crate) fn malformed(reason: impl Into<String>, text: &str) -> Self {
        AgentError::MalformedOutput {
            reason: reason.into(),
            excerpt: text.chars().take(200).collect(),
        }
    }
}

/// Failure of a pipeline stage
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Implementing was reached with neither a plan nor a continuation context
    #[error("cannot implement without a plan or a previous task context")]
    MissingPlan,

    #[error("{stage} produced malformed output: {reason}")]
    MalformedAgentOutput { stage: Stage, reason: String },

    #[error("{stage} agent call failed: {reason}")]
    AgentInvocation { stage: Stage, reason: String },

    /// Fix iterations ran out with tests still failing
    #[error("fix budget exhausted after {iterations} iteration(s); still failing: {}", failing_names(.failing))]
    FixBudgetExhausted {
        iterations: u32,
        failing: Vec<TestRecord>,
    },

    /// A deterministic helper (git, workspace scan) failed
    #[error("{stage} tool failed: {reason}")]
    Tool { stage: Stage, reason: String },
}

impl StageError {
    /// Attribute an agent failure to the stage that made the call
    pub fn from_agent(stage: Stage, err: AgentError) -> Self {
        match err {
            AgentError::MalformedOutput { reason, .. } => {
                StageError::MalformedAgentOutput { stage, reason }
            }
            other => StageError::AgentInvocation {
                stage,
                reason: other.to_string(),
            },
        }
    }

    /// Short machine-friendly kind, stored with task history
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::MissingPlan => "missing_plan",
            StageError::MalformedAgentOutput { .. } => "malformed_agent_output",
            StageError::AgentInvocation { .. } => "agent_invocation",
            StageError::FixBudgetExhausted { .. } => "fix_budget_exhausted",
            StageError::Tool { .. } => "tool",
        }
    }

    /// Tests still failing when the error was raised
    pub fn failing_tests(&self) -> &[TestRecord] {
        match self {
            StageError::FixBudgetExhausted { failing, .. } => failing,
            _ => &[],
        }
    }
}

fn failing_names(tests: &[TestRecord]) -> String {
    tests
        .iter()
        .map(|t| format!("{}::{}", t.test_file, t.test_name))
        .collect::<Vec<_>>()
        .join(", ")
}
