//! # Conveyor Models
//!
//! Model selectors and tool capabilities handed to the external coding agent.
//! The agent enforces the tool allow-list itself; Conveyor only decides what
//! goes into it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model class the agent should run with
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum AgentModel {
    #[default]
    Sonnet,
    Opus,
    Haiku,
}

impl AgentModel {
    /// Get all available models
    pub fn all() -> Vec<AgentModel> {
        vec![AgentModel::Sonnet, AgentModel::Opus, AgentModel::Haiku]
    }

    /// Name passed to the agent's `--model` flag
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentModel::Sonnet => "sonnet",
            AgentModel::Opus => "opus",
            AgentModel::Haiku => "haiku",
        }
    }
}

impl fmt::Display for AgentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sonnet" => Ok(AgentModel::Sonnet),
            "opus" => Ok(AgentModel::Opus),
            "haiku" => Ok(AgentModel::Haiku),
            other => Err(format!("unknown model '{}' (expected sonnet, opus or haiku)", other)),
        }
    }
}

/// A capability the agent may use during a stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentTool {
    Read,
    Edit,
    Write,
    /// Shell execution (builds, tests, git)
    Bash,
    Glob,
    Grep,
}

impl AgentTool {
    /// Read-only inspection tools
    pub const READ_ONLY: &'static [AgentTool] = &[AgentTool::Read, AgentTool::Glob, AgentTool::Grep];

    /// Everything a code-writing stage needs
    pub const ALL: &'static [AgentTool] = &[
        AgentTool::Read,
        AgentTool::Edit,
        AgentTool::Write,
        AgentTool::Bash,
        AgentTool::Glob,
        AgentTool::Grep,
    ];

    /// Inspect and execute, but never edit
    pub const EXECUTE: &'static [AgentTool] = &[
        AgentTool::Read,
        AgentTool::Bash,
        AgentTool::Glob,
        AgentTool::Grep,
    ];

    /// Just enough to drive version control
    pub const VCS: &'static [AgentTool] = &[AgentTool::Read, AgentTool::Bash];

    /// Tool name as the agent knows it
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentTool::Read => "Read",
            AgentTool::Edit => "Edit",
            AgentTool::Write => "Write",
            AgentTool::Bash => "Bash",
            AgentTool::Glob => "Glob",
            AgentTool::Grep => "Grep",
        }
    }
}
