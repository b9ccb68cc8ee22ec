//! # Task Scheduler
//!
//! Admits tasks up to a concurrency limit and queues the rest in arrival
//! order. A finishing task hands its slot straight to the head of the queue,
//! so a queued task can never be overtaken by a later submission.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tokio::sync::oneshot;

use crate::models::AgentModel;
use crate::state::{PipelineState, PreviousTaskContext, TaskReport};

use super::continuation::ContinuationManager;
use super::coordinator::Coordinator;
use super::events::{PipelineEvent, PipelineEventKind};
use super::pipeline::PipelineMode;

/// A task submitted to the scheduler
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub prompt: String,
    /// Overrides the classifier and `force_mode`
    pub mode: Option<PipelineMode>,
    pub model: Option<AgentModel>,
    pub workspace: Option<PathBuf>,
    pub previous: Option<PreviousTaskContext>,
    pub skills_context: Option<String>,
}

impl TaskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_model(mut self, model: AgentModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_previous(mut self, previous: PreviousTaskContext) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn with_skills_context(mut self, context: impl Into<String>) -> Self {
        self.skills_context = Some(context.into());
        self
    }
}

/// Handle to a submitted task
#[derive(Debug)]
pub struct TaskHandle {
    pub task_id: String,
    pub mode: PipelineMode,
    report: oneshot::Receiver<TaskReport>,
}

impl TaskHandle {
    /// Wait for the terminal report
    pub async fn wait(self) -> Result<TaskReport> {
        self.report
            .await
            .map_err(|_| anyhow::anyhow!("task {} ended without a report", self.task_id))
    }
}

struct QueuedTask {
    state: PipelineState,
    done: oneshot::Sender<TaskReport>,
}

#[derive(Default)]
struct Admission {
    running: usize,
    queue: VecDeque<QueuedTask>,
}

struct Shared {
    coordinator: Arc<Coordinator>,
    limit: usize,
    admission: Mutex<Admission>,
}

impl Shared {
    fn admission(&self) -> MutexGuard<'_, Admission> {
        // Admission counters stay consistent even if a holder panicked.
        self.admission.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Returns the slot when a running task ends, however it ends
struct SlotGuard {
    shared: Arc<Shared>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let next = {
            let mut admission = self.shared.admission();
            match admission.queue.pop_front() {
                Some(task) => Some(task),
                None => {
                    admission.running = admission.running.saturating_sub(1);
                    None
                }
            }
        };

        if let Some(task) = next {
            match tokio::runtime::Handle::try_current() {
                Ok(_) => spawn_task(self.shared.clone(), task),
                Err(_) => {
                    tracing::warn!(task_id = %task.state.task_id, "Runtime gone; dropping queued task");
                    let mut admission = self.shared.admission();
                    admission.running = admission.running.saturating_sub(1);
                }
            }
        }
    }
}

fn spawn_task(shared: Arc<Shared>, task: QueuedTask) {
    tokio::spawn(async move {
        let _slot = SlotGuard {
            shared: shared.clone(),
        };
        let report = shared.coordinator.run(task.state).await;
        let _ = task.done.send(report);
    });
}

/// Bounded FIFO scheduler over a shared coordinator
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

impl TaskScheduler {
    /// `max_concurrent` is clamped to at least one slot
    pub fn new(coordinator: Arc<Coordinator>, max_concurrent: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                coordinator,
                limit: max_concurrent.max(1),
                admission: Mutex::new(Admission::default()),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    pub fn running(&self) -> usize {
        self.shared.admission().running
    }

    pub fn queued(&self) -> usize {
        self.shared.admission().queue.len()
    }

    /// Admit a task now or queue it. Must be called inside a Tokio runtime.
    pub fn submit(&self, request: TaskRequest) -> TaskHandle {
        let state = self.shared.coordinator.prepare(request);
        let task_id = state.task_id.clone();
        let mode = state.mode;
        let (done, report) = oneshot::channel();
        let task = QueuedTask { state, done };

        let admitted = {
            let mut admission = self.shared.admission();
            if admission.running < self.shared.limit {
                admission.running += 1;
                Some(task)
            } else {
                admission.queue.push_back(task);
                None
            }
        };

        match admitted {
            Some(task) => {
                tracing::info!(task_id = %task_id, mode = %mode, "Task admitted");
                spawn_task(self.shared.clone(), task);
            }
            None => {
                tracing::info!(task_id = %task_id, queued = self.queued(), "Task queued");
                self.shared.coordinator.notify(
                    PipelineEvent::new(PipelineEventKind::TaskQueued, &task_id).with_mode(mode),
                );
            }
        }

        TaskHandle {
            task_id,
            mode,
            report,
        }
    }

    /// Continue a finished task from the task history
    pub fn submit_continuation(
        &self,
        request: TaskRequest,
        previous_task_id: &str,
    ) -> Result<TaskHandle> {
        let store = self
            .shared
            .coordinator
            .store()
            .ok_or_else(|| anyhow::anyhow!("continuations need a task store"))?;
        let previous = ContinuationManager::new(store).from_history(previous_task_id)?;
        Ok(self.submit(request.with_previous(previous)))
    }
}
