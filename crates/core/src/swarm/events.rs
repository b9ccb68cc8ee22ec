//! # Pipeline Events
//!
//! Progress events streamed to observers (the CLI prints them).

use super::pipeline::{PipelineMode, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of pipeline event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// Waiting for a free slot
    TaskQueued,
    /// Slot acquired, pipeline starting
    TaskStarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    /// Verification left failing tests; a fix cycle follows
    FixIterationStarted,
    TaskSucceeded,
    TaskFailed,
}

/// An event in a task's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique event ID
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: PipelineEventKind,
    pub task_id: String,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub mode: Option<PipelineMode>,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl PipelineEvent {
    pub fn new(kind: PipelineEventKind, task_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            task_id: task_id.to_string(),
            stage: None,
            mode: None,
            data: None,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = PipelineEvent::new(PipelineEventKind::StageStarted, "task-1")
            .with_stage(Stage::Planning)
            .with_data(serde_json::json!({"attempt": 1}));

        assert_eq!(event.task_id, "task-1");
        assert_eq!(event.stage, Some(Stage::Planning));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "stage_started");
        assert_eq!(json["stage"], "planning");
    }
}
