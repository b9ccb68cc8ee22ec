//! # Continuation
//!
//! Lets a new task pick up where a previous one stopped. The previous task's
//! change records become a header on the prompt, and its latest code-writing
//! session is resumed by the first code-writing stage.

use crate::state::{ChangeRecord, PipelineState, PreviousTaskContext, TaskStore};
use anyhow::Result;

/// One `file (action): summary` line per change
pub fn render_change_lines(changes: &[ChangeRecord]) -> String {
    changes
        .iter()
        .map(ChangeRecord::render_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix `prompt` with the continuation header for `previous`
pub fn build_continuation_prompt(prompt: &str, previous: &PreviousTaskContext) -> String {
    let mut out = format!(
        "## Continuing previous task {}\n\n\
         This resumes earlier work. Do not start over: build on the changes already applied.\n",
        previous.task_id
    );
    if previous.changes.is_empty() {
        out.push_str("\nThe previous task recorded no file changes.\n");
    } else {
        out.push_str("\nChanges already applied:\n");
        out.push_str(&render_change_lines(&previous.changes));
        out.push('\n');
    }
    out.push_str(&format!("\n## New request\n\n{}\n", prompt.trim()));
    out
}

/// Session the first code-writing stage should resume
pub fn resume_session(previous: &PreviousTaskContext) -> Option<String> {
    previous.sessions.latest_code_session().map(String::from)
}

/// Attach `previous` to a fresh task. Locating and Planning are skipped from here on.
pub fn attach(state: &mut PipelineState, previous: PreviousTaskContext) {
    tracing::info!(
        task_id = %state.task_id,
        previous_task_id = %previous.task_id,
        prior_changes = previous.changes.len(),
        "Attaching continuation context"
    );
    state.previous = Some(previous);
}

/// Resolves prior task ids through the task history
pub struct ContinuationManager<'a> {
    store: &'a TaskStore,
}

impl<'a> ContinuationManager<'a> {
    pub fn new(store: &'a TaskStore) -> Self {
        Self { store }
    }

    pub fn from_history(&self, task_id: &str) -> Result<PreviousTaskContext> {
        self.store
            .load_previous_context(task_id)?
            .ok_or_else(|| anyhow::anyhow!("Unknown task '{}': nothing to continue from", task_id))
    }
}
