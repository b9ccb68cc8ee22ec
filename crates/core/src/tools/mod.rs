//! # Workspace Tools
//!
//! Deterministic helpers that run beside the agent instead of asking it.
//!
//! - `git` - Working-tree status and HEAD commit (git2)
//! - `workspace` - Candidate file listing (ignore)

pub mod git;
pub mod workspace;

pub use git::{head_commit, working_tree_status, FileStatus, WorkingTreeStatus};
pub use workspace::{list_files, WorkspaceListing};
