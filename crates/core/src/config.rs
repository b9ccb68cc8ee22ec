//! # Pipeline Configuration
//!
//! Layered in order: defaults, then `.conveyor/config.json`, then `CONVEYOR_*`
//! environment variables.

use crate::models::AgentModel;
use crate::state::io;
use crate::swarm::pipeline::{PipelineMode, Stage};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_FIX_ITERATIONS: u32 = 3;
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 15;
/// 15 minutes per agent invocation
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 900;

/// Configuration consumed by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model used when a stage has no override
    pub default_model: AgentModel,
    /// Fix/verify passes allowed after the first failing verification
    pub max_fix_iterations: u32,
    /// Pipelines allowed to run at once; the rest wait in FIFO order
    pub max_concurrent_tasks: usize,
    /// Directory the agent works in
    pub workspace_root: PathBuf,
    /// Wall-clock deadline per agent call, in seconds
    pub agent_timeout_secs: u64,
    /// Agent CLI executable
    pub agent_bin: String,
    /// Extra flags appended to every agent invocation
    pub agent_args: Vec<String>,
    /// Skip the classifier and always use this mode (request mode still wins)
    pub force_mode: Option<PipelineMode>,
    /// Task history database
    pub db_path: PathBuf,
    /// Per-stage model overrides (stage -> model)
    pub stage_models: HashMap<Stage, AgentModel>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_model: AgentModel::default(),
            max_fix_iterations: DEFAULT_MAX_FIX_ITERATIONS,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            workspace_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            agent_timeout_secs: DEFAULT_AGENT_TIMEOUT_SECS,
            agent_bin: "claude".to_string(),
            agent_args: Vec::new(),
            force_mode: None,
            db_path: io::runtime_file("conveyor.db"),
            stage_models: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the runtime config file, then the process environment
    pub async fn load() -> Result<Self> {
        let path = io::runtime_file("config.json");
        let mut config = match io::read_optional(&path).await? {
            Some(content) => serde_json::from_str::<Self>(&content)
                .with_context(|| format!("Invalid config file: {:?}", path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `CONVEYOR_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("CONVEYOR_MODEL") {
            self.default_model = model
                .parse()
                .map_err(|e: String| anyhow::anyhow!("CONVEYOR_MODEL: {}", e))?;
        }
        if let Some(value) = get("CONVEYOR_MAX_FIX_ITERATIONS") {
            self.max_fix_iterations = value
                .trim()
                .parse()
                .with_context(|| format!("CONVEYOR_MAX_FIX_ITERATIONS: invalid number '{}'", value))?;
        }
        if let Some(value) = get("CONVEYOR_MAX_CONCURRENT_TASKS") {
            self.max_concurrent_tasks = value.trim().parse().with_context(|| {
                format!("CONVEYOR_MAX_CONCURRENT_TASKS: invalid number '{}'", value)
            })?;
        }
        if let Some(root) = get("CONVEYOR_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Some(value) = get("CONVEYOR_AGENT_TIMEOUT_SECS") {
            self.agent_timeout_secs = value.trim().parse().with_context(|| {
                format!("CONVEYOR_AGENT_TIMEOUT_SECS: invalid number '{}'", value)
            })?;
        }
        if let Some(bin) = get("CONVEYOR_AGENT_BIN") {
            self.agent_bin = bin;
        }
        if let Some(mode) = get("CONVEYOR_FORCE_MODE") {
            self.force_mode = Some(
                mode.parse()
                    .map_err(|e: String| anyhow::anyhow!("CONVEYOR_FORCE_MODE: {}", e))?,
            );
        }
        if let Some(path) = get("CONVEYOR_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }

        if self.max_concurrent_tasks == 0 {
            anyhow::bail!("max_concurrent_tasks must be at least 1");
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// Model for a stage: per-stage override, then the task's model
    pub fn model_for(&self, stage: Stage, task_model: AgentModel) -> AgentModel {
        self.stage_models.get(&stage).copied().unwrap_or(task_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_fix_iterations, 3);
        assert_eq!(config.max_concurrent_tasks, 15);
        assert_eq!(config.agent_timeout(), Duration::from_secs(900));
        assert_eq!(config.default_model, AgentModel::Sonnet);
        assert!(config.force_mode.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config
            .apply_env(env(&[
                ("CONVEYOR_MODEL", "opus"),
                ("CONVEYOR_MAX_FIX_ITERATIONS", "5"),
                ("CONVEYOR_MAX_CONCURRENT_TASKS", "2"),
                ("CONVEYOR_FORCE_MODE", "fast"),
                ("CONVEYOR_WORKSPACE_ROOT", "/tmp/ws"),
            ]))
            .unwrap();

        assert_eq!(config.default_model, AgentModel::Opus);
        assert_eq!(config.max_fix_iterations, 5);
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.force_mode, Some(PipelineMode::Fast));
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/ws"));
    }

    #[test]
    fn test_invalid_env_is_an_error() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_env(env(&[("CONVEYOR_MAX_FIX_ITERATIONS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("CONVEYOR_MAX_FIX_ITERATIONS"));

        let mut config = PipelineConfig::default();
        assert!(config
            .apply_env(env(&[("CONVEYOR_MAX_CONCURRENT_TASKS", "0")]))
            .is_err());
    }

    #[test]
    fn test_partial_config_file() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"max_fix_iterations": 1, "agent_args": ["--permission-mode", "acceptEdits"], "stage_models": {"planning": "opus"}}"#,
        )
        .unwrap();
        assert_eq!(config.max_fix_iterations, 1);
        assert_eq!(config.agent_args, vec!["--permission-mode", "acceptEdits"]);
        assert_eq!(config.max_concurrent_tasks, 15);
        assert_eq!(
            config.model_for(Stage::Planning, AgentModel::Haiku),
            AgentModel::Opus
        );
        assert_eq!(
            config.model_for(Stage::Implementing, AgentModel::Haiku),
            AgentModel::Haiku
        );
    }
}
