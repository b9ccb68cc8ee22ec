//! # Pipeline Orchestration
//!
//! Drives tasks through their stages and bounds how many run at once.
//!
//! ## Task Flow
//!
//! ```text
//! TaskRequest → TaskScheduler (FIFO, N slots) → Coordinator → Skills → TaskReport
//!                                                   │
//!                                     PipelineMachine + FixLoop
//! ```

pub mod classify;
pub mod continuation;
pub mod coordinator;
pub mod events;
pub mod fix_loop;
pub mod pipeline;
pub mod scheduler;

pub use classify::{classify, resolve_mode};
pub use continuation::ContinuationManager;
pub use coordinator::{Coordinator, StageOutcome};
pub use events::{PipelineEvent, PipelineEventKind};
pub use fix_loop::FixLoop;
pub use pipeline::{PipelineMachine, PipelineMode, Stage, TaskStatus};
pub use scheduler::{TaskHandle, TaskRequest, TaskScheduler};
