//! # Verifier Skill
//!
//! Runs the tests and reports one record per test. A failing test is a normal
//! result here; the coordinator decides whether to enter the fix loop.

use super::SkillContext;
use crate::agent::AgentOutput;
use crate::error::StageError;
use crate::models::AgentTool;
use crate::state::{PipelineState, TestRecord};
use crate::swarm::continuation::render_change_lines;
use crate::swarm::pipeline::Stage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const MAX_TURNS: u32 = 30;

/// Output from the verifier
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VerificationOutput {
    pub tests: Vec<TestRecord>,
}

impl VerificationOutput {
    pub fn failing(&self) -> Vec<TestRecord> {
        self.tests.iter().filter(|t| !t.passed).cloned().collect()
    }
}

impl AgentOutput for VerificationOutput {
    fn validate(&self) -> Result<(), String> {
        if self.tests.iter().any(|t| t.test_name.trim().is_empty()) {
            return Err("test record without a name".to_string());
        }
        Ok(())
    }
}

pub struct VerifierSkill;

impl VerifierSkill {
    pub fn build_prompt(state: &PipelineState) -> String {
        let mut prompt = format!("## Task that was implemented\n\n{}\n\n", state.prompt.trim());
        if state.changes.is_empty() {
            prompt.push_str("## Changes to verify\n\nNo file changes were recorded.\n");
        } else {
            prompt.push_str("## Changes to verify\n\n");
            prompt.push_str(&render_change_lines(&state.changes));
            prompt.push('\n');
        }
        prompt
    }

    /// Run a fresh verification pass. `state.tests` always holds the latest result.
    pub async fn run(
        state: &mut PipelineState,
        ctx: &SkillContext<'_>,
    ) -> Result<VerificationOutput, StageError> {
        let prompt = Self::build_prompt(state);
        let request = ctx.request(state, Stage::Verifying, prompt, AgentTool::EXECUTE, MAX_TURNS);
        let invocation = ctx.invoke::<VerificationOutput>(request).await?;

        state.sessions.set(Stage::Verifying, invocation.session_id);
        state.tests = invocation.parsed.tests.clone();

        tracing::info!(
            task_id = %state.task_id,
            total = invocation.parsed.tests.len(),
            failing = invocation.parsed.failing().len(),
            "Verification finished"
        );
        Ok(invocation.parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_filter() {
        let output: VerificationOutput = serde_json::from_str(
            r#"{"tests": [
                {"test_file": "t.rs", "test_name": "ok", "passed": true},
                {"test_file": "t.rs", "test_name": "bad", "passed": false, "error_message": "nope"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(output.failing().len(), 1);
        assert_eq!(output.failing()[0].test_name, "bad");
    }

    #[test]
    fn test_no_tests_counts_as_passing() {
        let output = VerificationOutput { tests: vec![] };
        assert!(output.failing().is_empty());
        assert!(output.validate().is_ok());
    }
}
