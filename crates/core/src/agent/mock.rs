//! Scripted backend for tests.

use super::{AgentBackend, AgentRequest, AgentResponse};
use crate::error::AgentError;
use crate::swarm::pipeline::Stage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

type Script = dyn Fn(&AgentRequest) -> Result<String, AgentError> + Send + Sync;

/// Answers each request from a closure and records every call
pub struct MockBackend {
    script: Box<Script>,
    calls: Mutex<Vec<AgentRequest>>,
    counter: AtomicUsize,
    /// When set, each call waits for (and consumes) one permit first
    gate: Option<Arc<Semaphore>>,
}

impl MockBackend {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&AgentRequest) -> Result<String, AgentError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Backend returning `canned` output for every stage
    pub fn happy() -> Self {
        Self::new(|request| Ok(canned(request.stage)))
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<AgentRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn prompts_for(&self, stage: Stage) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.stage == stage)
            .map(|c| c.prompt)
            .collect()
    }
}

#[async_trait]
impl AgentBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| AgentError::Invocation(e.to_string()))?
                .forget();
        }

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let text = (self.script)(request)?;

        Ok(AgentResponse {
            text,
            session_id: format!("{}-session-{}", request.stage, n),
        })
    }
}

/// Valid happy-path answer for each stage
pub fn canned(stage: Stage) -> String {
    match stage {
        Stage::Locating => r#"Found them.
{"files": [{"path": "src/lib.rs", "reason": "entry point"}], "summary": "one file"}"#
            .to_string(),
        Stage::Planning => r#"{"summary": "add a greeting", "steps": [{"file": "src/lib.rs", "description": "add greet()"}]}"#
            .to_string(),
        Stage::Implementing | Stage::Fixing | Stage::FastDev | Stage::Simple => {
            r#"Done.
```json
{"changes": [{"file": "src/lib.rs", "action": "modified", "summary": "add greet()"}], "summary": "added greet"}
```"#
                .to_string()
        }
        Stage::Verifying => {
            r#"{"tests": [{"test_file": "tests/greet.rs", "test_name": "greets", "passed": true}]}"#
                .to_string()
        }
        Stage::Finalizing | Stage::FastFinish => {
            r#"{"committed": true, "commit_message": "Add greet", "commit_sha": "abc123"}"#
                .to_string()
        }
    }
}
