//! # IO Utilities
//!
//! Paths and file helpers for the `.conveyor` runtime directory, which holds
//! `config.json`, `.env` and the task history database.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Get the runtime directory path (.conveyor)
///
/// `CONVEYOR_RUNTIME_PATH` overrides the default under the current directory.
pub fn get_runtime_path() -> PathBuf {
    if let Ok(path) = std::env::var("CONVEYOR_RUNTIME_PATH") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".conveyor")
}

/// Path of a file inside the runtime directory
pub fn runtime_file(relative_path: impl AsRef<Path>) -> PathBuf {
    get_runtime_path().join(relative_path)
}

/// Read a file if it exists. A missing file is `Ok(None)`.
pub async fn read_optional(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read file: {:?}", path)),
    }
}
