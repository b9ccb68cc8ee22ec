pub mod db;
pub mod io;
pub mod task_state;

pub use db::{TaskStore, TaskSummary};

pub use task_state::{
    ChangeAction, ChangeRecord, CommitRecord, LocatedFile, PipelineState, Plan, PlanStep,
    PreviousTaskContext, SessionIds, StageRecord, TaskFailure, TaskReport, TestRecord,
};
