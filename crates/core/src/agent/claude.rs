//! # Claude CLI Backend
//!
//! Runs the `claude` CLI in print mode with JSON output, prompt on stdin:
//!
//! ```text
//! claude -p --output-format json --model sonnet --max-turns 50 \
//!        --allowedTools Read,Edit,Write --append-system-prompt "..." [--resume <id>]
//! ```
//!
//! The CLI prints one envelope object: `{"result": "...", "session_id": "...", "is_error": false}`.

use super::{AgentBackend, AgentRequest, AgentResponse};
use crate::error::AgentError;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Envelope printed by `claude --output-format json`
#[derive(Debug, Deserialize)]
struct CliEnvelope {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    subtype: Option<String>,
}

/// Agent backend that shells out to the Claude CLI
#[derive(Debug, Clone)]
pub struct ClaudeCliBackend {
    binary: String,
    extra_args: Vec<String>,
}

impl Default for ClaudeCliBackend {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeCliBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    /// Extra flags appended to every call (e.g. `--permission-mode acceptEdits`)
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command_args(&self, request: &AgentRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--model".to_string(),
            request.model.as_str().to_string(),
            "--max-turns".to_string(),
            request.max_turns.to_string(),
        ];

        if !request.allowed_tools.is_empty() {
            let tools = request
                .allowed_tools
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(",");
            args.push("--allowedTools".to_string());
            args.push(tools);
        }

        if !request.system_prompt.trim().is_empty() {
            args.push("--append-system-prompt".to_string());
            args.push(request.system_prompt.clone());
        }

        if let Some(session) = &request.resume_session {
            args.push("--resume".to_string());
            args.push(session.clone());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Turn the CLI's stdout into an `AgentResponse`
fn parse_envelope(stdout: &str, stderr: &str, exit_ok: bool) -> Result<AgentResponse, AgentError> {
    let envelope: CliEnvelope = match serde_json::from_str(stdout.trim()) {
        Ok(envelope) => envelope,
        Err(e) if exit_ok => {
            return Err(AgentError::Invocation(format!(
                "unreadable CLI output: {}",
                e
            )))
        }
        Err(_) => {
            return Err(AgentError::Invocation(format!(
                "agent exited with an error: {}",
                stderr.trim()
            )))
        }
    };

    if envelope.is_error {
        let detail = envelope
            .result
            .filter(|r| !r.trim().is_empty())
            .or(envelope.subtype)
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(AgentError::AgentReported(detail));
    }

    let session_id = envelope
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Invocation("CLI output carried no session_id".to_string()))?;

    Ok(AgentResponse {
        text: envelope.result.unwrap_or_default(),
        session_id,
    })
}

#[async_trait]
impl AgentBackend for ClaudeCliBackend {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let mut child = Command::new(&self.binary)
            .args(self.command_args(request))
            .current_dir(&request.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Invocation(format!("failed to spawn {}: {}", self.binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .await
                .map_err(|e| AgentError::Invocation(format!("failed to write prompt: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AgentError::Invocation(format!("failed to wait for agent: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_envelope(&stdout, &stderr, output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentModel, AgentTool};
    use crate::swarm::pipeline::Stage;
    use std::path::PathBuf;

    fn request() -> AgentRequest {
        AgentRequest {
            stage: Stage::Implementing,
            prompt: "Do it".to_string(),
            system_prompt: "You implement.".to_string(),
            allowed_tools: vec![AgentTool::Read, AgentTool::Edit],
            model: AgentModel::Opus,
            max_turns: 50,
            workspace: PathBuf::from("."),
            resume_session: Some("sess-1".to_string()),
        }
    }

    #[test]
    fn test_command_args() {
        let backend = ClaudeCliBackend::default().with_args(["--verbose"]);
        let args = backend.command_args(&request());
        let joined = args.join(" ");
        assert!(joined.starts_with("-p --output-format json --model opus --max-turns 50"));
        assert!(joined.contains("--allowedTools Read,Edit"));
        assert!(joined.contains("--resume sess-1"));
        assert_eq!(args.last().map(String::as_str), Some("--verbose"));
    }

    #[test]
    fn test_parse_success_envelope() {
        let stdout = r#"{"type":"result","subtype":"success","is_error":false,"result":"{\"ok\":true}","session_id":"abc"}"#;
        let response = parse_envelope(stdout, "", true).unwrap();
        assert_eq!(response.session_id, "abc");
        assert_eq!(response.text, "{\"ok\":true}");
    }

    #[test]
    fn test_parse_error_envelope() {
        let stdout = r#"{"type":"result","subtype":"error_max_turns","is_error":true,"session_id":"abc"}"#;
        let err = parse_envelope(stdout, "", false).unwrap_err();
        assert!(matches!(err, AgentError::AgentReported(ref d) if d == "error_max_turns"));
    }

    #[test]
    fn test_parse_garbage_with_failed_exit() {
        let err = parse_envelope("", "command not found", false).unwrap_err();
        assert!(err.to_string().contains("command not found"));
    }
}
