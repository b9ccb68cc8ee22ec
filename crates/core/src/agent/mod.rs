//! # Agent Invoker
//!
//! One call to the external code-generation agent.
//!
//! ```text
//! Skill ── AgentRequest ──▶ AgentInvoker ──▶ AgentBackend (claude CLI, mock)
//!   ▲                          │ deadline, expected shape
//!   └── Invocation<T> ◀────────┘ first JSON object → T → validate()
//! ```
//!
//! The invoker is stateless between calls and never retries: retry policy
//! belongs to the caller.

pub mod claude;
pub mod json;
#[cfg(test)]
pub(crate) mod mock;

use crate::error::AgentError;
use crate::models::{AgentModel, AgentTool};
use crate::swarm::pipeline::Stage;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use claude::ClaudeCliBackend;
pub use json::{extract_first_json_object, parse_agent_output};

/// Structured result an agent must return for a stage
///
/// The JSON schema derived from the type is appended to the prompt, and the
/// parsed value goes through `validate` before the stage sees it.
pub trait AgentOutput: DeserializeOwned + JsonSchema + Send + 'static {
    /// Semantic checks serde cannot express
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Everything the agent needs for one call
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Stage making the call (not sent to the agent)
    pub stage: Stage,
    pub prompt: String,
    pub system_prompt: String,
    /// Enforced by the agent, not by Conveyor
    pub allowed_tools: Vec<AgentTool>,
    pub model: AgentModel,
    pub max_turns: u32,
    /// Directory the agent works in
    pub workspace: PathBuf,
    /// Continue this conversation instead of starting a new one
    pub resume_session: Option<String>,
}

/// Raw answer from a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    /// Free-text result (expected to contain one JSON object)
    pub text: String,
    /// Names the agent conversation for later continuation
    pub session_id: String,
}

/// Parsed answer
#[derive(Debug, Clone)]
pub struct Invocation<T> {
    pub parsed: T,
    pub session_id: String,
}

/// Transport to an agent implementation
#[async_trait]
pub trait AgentBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError>;
}

/// Append the optional skills context to a stage's base system prompt
pub fn build_system_prompt(base: &str, skills_context: Option<&str>) -> String {
    match skills_context.map(str::trim).filter(|s| !s.is_empty()) {
        Some(context) => format!("{}\n\n## Skills context\n\n{}\n", base.trim_end(), context),
        None => base.to_string(),
    }
}

/// JSON schema of the expected result, pretty-printed
pub fn expected_shape<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

fn with_expected_shape<T: JsonSchema>(prompt: &str) -> String {
    format!(
        "{}\n\n## Response format\n\nWhen you are done, reply with exactly one JSON object matching this schema and nothing after it:\n\n```json\n{}\n```\n",
        prompt.trim_end(),
        expected_shape::<T>()
    )
}

/// Wraps one backend with the per-invocation deadline
#[derive(Clone)]
pub struct AgentInvoker {
    backend: Arc<dyn AgentBackend>,
    timeout: Duration,
}

impl AgentInvoker {
    pub fn new(backend: Arc<dyn AgentBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` and parse the answer into `T`
    pub async fn invoke<T: AgentOutput>(
        &self,
        mut request: AgentRequest,
    ) -> Result<Invocation<T>, AgentError> {
        request.prompt = with_expected_shape::<T>(&request.prompt);

        tracing::debug!(
            stage = %request.stage,
            backend = self.backend.name(),
            model = %request.model,
            max_turns = request.max_turns,
            resume = request.resume_session.is_some(),
            "Invoking agent"
        );

        let started = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.backend.send(&request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(stage = %request.stage, timeout = ?self.timeout, "Agent call timed out");
                return Err(AgentError::Timeout(self.timeout));
            }
        };

        let parsed = parse_agent_output::<T>(&response.text)?;

        tracing::debug!(
            stage = %request.stage,
            session_id = %response.session_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Agent call completed"
        );

        Ok(Invocation {
            parsed,
            session_id: response.session_id,
        })
    }
}
