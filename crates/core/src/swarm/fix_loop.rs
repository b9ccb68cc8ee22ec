//! # Fix Loop
//!
//! Bounds the fix/verify passes that follow a failed verification and keeps
//! the failing-test history folded into each fix prompt.

use crate::error::StageError;
use crate::state::TestRecord;

/// Fix loop controller for one task
#[derive(Debug, Clone)]
pub struct FixLoop {
    max_iterations: u32,
    iterations: u32,
    /// Failing set after each verification, oldest first
    history: Vec<Vec<TestRecord>>,
}

impl FixLoop {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            iterations: 0,
            history: Vec::new(),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn can_retry(&self) -> bool {
        self.iterations < self.max_iterations
    }

    /// Claim the next iteration. Returns false once the budget is spent.
    pub fn begin_iteration(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.iterations += 1;
        true
    }

    /// Store the failing tests of the latest verification
    pub fn record(&mut self, tests: &[TestRecord]) {
        let failing: Vec<TestRecord> = tests.iter().filter(|t| !t.passed).cloned().collect();
        if !failing.is_empty() {
            self.history.push(failing);
        }
    }

    /// Failing tests from the latest verification
    pub fn current_failures(&self) -> &[TestRecord] {
        self.history.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every distinct failure seen so far, rendered for the fix prompt.
    ///
    /// The latest message wins when a test failed more than once.
    pub fn failure_summary(&self) -> String {
        let mut seen: Vec<(String, String)> = Vec::new();
        for test in self.history.iter().flatten() {
            let key = format!("{}::{}", test.test_file, test.test_name);
            let line = test.summary_line();
            match seen.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = line,
                None => seen.push((key, line)),
            }
        }
        seen.into_iter()
            .map(|(_, line)| format!("- {}", line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Terminal error carrying the final failing set
    pub fn exhausted(&self) -> StageError {
        StageError::FixBudgetExhausted {
            iterations: self.iterations,
            failing: self.current_failures().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_budget() {
        let mut fix_loop = FixLoop::new(2);
        assert!(fix_loop.begin_iteration());
        assert!(fix_loop.begin_iteration());
        assert!(!fix_loop.begin_iteration());
        assert_eq!(fix_loop.iterations(), 2);
        assert!(!fix_loop.can_retry());
    }

    #[test]
    fn test_summary_accumulates_across_iterations() {
        let mut fix_loop = FixLoop::new(3);
        fix_loop.record(&[
            TestRecord::failed("a.rs", "one", "boom"),
            TestRecord::passed("a.rs", "two"),
        ]);
        fix_loop.record(&[
            TestRecord::failed("a.rs", "one", "still boom"),
            TestRecord::failed("b.rs", "three", "new failure"),
        ]);

        let summary = fix_loop.failure_summary();
        assert_eq!(summary.lines().count(), 2);
        assert!(summary.contains("a.rs::one: still boom"));
        assert!(summary.contains("b.rs::three: new failure"));
        assert!(!summary.contains("two"));
    }

    #[test]
    fn test_exhausted_carries_latest_failures() {
        let mut fix_loop = FixLoop::new(1);
        fix_loop.record(&[TestRecord::failed("a.rs", "one", "boom")]);
        fix_loop.begin_iteration();
        fix_loop.record(&[TestRecord::failed("a.rs", "one", "again")]);

        match fix_loop.exhausted() {
            StageError::FixBudgetExhausted { iterations, failing } => {
                assert_eq!(iterations, 1);
                assert_eq!(failing.len(), 1);
                assert_eq!(failing[0].error_message.as_deref(), Some("again"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_all_passing_records_nothing() {
        let mut fix_loop = FixLoop::new(3);
        fix_loop.record(&[TestRecord::passed("a.rs", "one")]);
        assert!(fix_loop.current_failures().is_empty());
        assert!(fix_loop.failure_summary().is_empty());
    }
}
