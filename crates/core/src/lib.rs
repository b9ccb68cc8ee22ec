//! # Conveyor Core
//!
//! Pipeline orchestration for an external code agent: stage skills, the
//! fix loop, continuations, task history and the bounded scheduler.
//!
//! ## Architecture
//!
//! - `agent/` - Agent backend trait, the CLI backend and JSON output parsing
//! - `skills/` - One skill per pipeline stage, with its default prompt
//! - `state/` - Per-task state, task reports and the SQLite task history
//! - `swarm/` - State machine, coordinator and scheduler
//! - `tools/` - Deterministic helpers (git status, workspace listing)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conveyor_core::agent::{AgentInvoker, ClaudeCliBackend};
//! use conveyor_core::swarm::{Coordinator, TaskRequest, TaskScheduler};
//!
//! let config = Arc::new(PipelineConfig::load().await?);
//! let invoker = AgentInvoker::new(Arc::new(ClaudeCliBackend::default()), config.agent_timeout());
//! let coordinator = Arc::new(Coordinator::new(invoker, config.clone()));
//! let scheduler = TaskScheduler::new(coordinator, config.max_concurrent_tasks);
//! let report = scheduler.submit(TaskRequest::new("Add a --verbose flag")).wait().await?;
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod models;
pub mod skills;
pub mod state;
pub mod swarm;
pub mod tools;

pub use config::PipelineConfig;
pub use error::{AgentError, StageError};
