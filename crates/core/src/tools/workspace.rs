//! Candidate file listing for the Locator, honoring `.gitignore`.

use anyhow::Result;
use std::path::Path;

/// Relative file paths of a workspace, sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceListing {
    pub files: Vec<String>,
    /// More files exist than were listed
    pub truncated: bool,
}

/// List at most `limit` files under `root` (async wrapper)
pub async fn list_files(root: &Path, limit: usize) -> Result<WorkspaceListing> {
    let root = root.to_path_buf();

    // The walk is blocking filesystem IO
    tokio::task::spawn_blocking(move || list_files_sync(&root, limit)).await?
}

fn list_files_sync(root: &Path, limit: usize) -> Result<WorkspaceListing> {
    if !root.is_dir() {
        anyhow::bail!("Workspace is not a directory: {:?}", root);
    }

    let walker = ignore::WalkBuilder::new(root)
        .git_ignore(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    // One past the limit tells a full listing apart from a cut one.
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
        if files.len() > limit {
            break;
        }
    }

    let truncated = files.len() > limit;
    if truncated {
        tracing::debug!(limit, "Workspace listing truncated");
    }
    files.truncate(limit);
    files.sort();
    Ok(WorkspaceListing { files, truncated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(count: usize) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("conveyor-ws-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            std::fs::write(dir.join(format!("file{i}.txt")), "x").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_lists_crate_files() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let listing = list_files(root, 10_000).await.unwrap();
        assert!(listing.files.iter().any(|f| f == "Cargo.toml"));
        assert!(listing.files.iter().any(|f| f == "src/lib.rs"));
        assert!(!listing.truncated);
    }

    #[tokio::test]
    async fn test_limit_marks_truncation() {
        let dir = scratch_dir(3);
        let listing = list_files(&dir, 2).await.unwrap();
        assert_eq!(listing.files.len(), 2);
        assert!(listing.truncated);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_exactly_limit_is_not_truncated() {
        let dir = scratch_dir(3);
        let listing = list_files(&dir, 3).await.unwrap();
        assert_eq!(listing.files, vec!["file0.txt", "file1.txt", "file2.txt"]);
        assert!(!listing.truncated);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_missing_root() {
        tokio_test::assert_err!(list_files(Path::new("/definitely/not/here"), 10).await);
    }
}
