//! # Git Inspection
//!
//! Read-only views of the workspace repository for the finalize stages: the
//! working-tree status shown to the agent before it commits, and the HEAD
//! commit read back afterwards.

use anyhow::{Context, Result};
use git2::{Repository, Status, StatusOptions};
use std::fmt;
use std::path::Path;

/// Kind of change git reports for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
    Renamed,
    Conflicted,
}

impl FileStatus {
    fn from_git(status: Status) -> Option<Self> {
        if status.is_conflicted() {
            Some(Self::Conflicted)
        } else if status.intersects(Status::INDEX_NEW | Status::WT_NEW) {
            Some(Self::New)
        } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
            Some(Self::Deleted)
        } else if status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED) {
            Some(Self::Renamed)
        } else if status.intersects(
            Status::INDEX_MODIFIED
                | Status::WT_MODIFIED
                | Status::INDEX_TYPECHANGE
                | Status::WT_TYPECHANGE,
        ) {
            Some(Self::Modified)
        } else {
            None
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Conflicted => "conflicted",
        };
        f.write_str(label)
    }
}

/// Uncommitted changes in a repository
#[derive(Debug, Clone, Default)]
pub struct WorkingTreeStatus {
    pub branch: Option<String>,
    pub entries: Vec<(String, FileStatus)>,
}

impl WorkingTreeStatus {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    /// `status: path` lines, or a note when clean
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(branch) = &self.branch {
            out.push_str(&format!("On branch {}\n", branch));
        }
        if self.is_clean() {
            out.push_str("Working tree clean\n");
        }
        for (path, status) in &self.entries {
            out.push_str(&format!("{}: {}\n", status, path));
        }
        out
    }
}

/// Status of the repository containing `workspace` (async wrapper)
pub async fn working_tree_status(workspace: &Path) -> Result<WorkingTreeStatus> {
    let workspace = workspace.to_path_buf();

    // Status scans recurse into untracked directories
    tokio::task::spawn_blocking(move || working_tree_status_sync(&workspace)).await?
}

fn working_tree_status_sync(workspace: &Path) -> Result<WorkingTreeStatus> {
    let repo = Repository::discover(workspace)
        .with_context(|| format!("Failed to open repository at {:?}", workspace))?;

    let branch = repo
        .head()
        .ok()
        .and_then(|head| head.shorthand().map(String::from));

    let mut options = StatusOptions::new();
    options.include_untracked(true).recurse_untracked_dirs(true);

    let statuses = repo
        .statuses(Some(&mut options))
        .context("Failed to read repository status")?;

    let entries = statuses
        .iter()
        .filter_map(|entry| {
            let path = entry.path()?.to_string();
            FileStatus::from_git(entry.status()).map(|status| (path, status))
        })
        .collect();

    Ok(WorkingTreeStatus { branch, entries })
}

/// Full sha of HEAD, `None` for a repository without commits
pub async fn head_commit(workspace: &Path) -> Result<Option<String>> {
    let workspace = workspace.to_path_buf();
    tokio::task::spawn_blocking(move || head_commit_sync(&workspace)).await?
}

fn head_commit_sync(workspace: &Path) -> Result<Option<String>> {
    let repo = Repository::discover(workspace)
        .with_context(|| format!("Failed to open repository at {:?}", workspace))?;

    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
        Err(e) => return Err(e).context("Failed to get HEAD"),
    };
    let commit = head.peel_to_commit().context("Failed to get HEAD commit")?;
    Ok(Some(commit.id().to_string()))
}
