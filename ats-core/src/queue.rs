//! Load queue identity, state and execution statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a load queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadQueueState {
    Created,
    Scheduled,
    Running,
    Paused,
    Finished,
    Cancelled,
}

impl LoadQueueState {
    /// Finished and cancelled queues never leave their state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadQueueState::Finished | LoadQueueState::Cancelled)
    }
}

impl fmt::Display for LoadQueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadQueueState::Created => "CREATED",
            LoadQueueState::Scheduled => "SCHEDULED",
            LoadQueueState::Running => "RUNNING",
            LoadQueueState::Paused => "PAUSED",
            LoadQueueState::Finished => "FINISHED",
            LoadQueueState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Outcome of a finished queue, judged against its pass rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadQueueResult {
    Passed,
    Failed,
}

/// Passed/failed counters for one action of a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionExecutionStats {
    pub passed: u64,
    pub failed: u64,
    /// Cumulative execution time of passed invocations, in milliseconds
    pub total_time_ms: u64,
    pub transfer_unit: Option<String>,
}

impl ActionExecutionStats {
    pub fn average_time_ms(&self) -> u64 {
        if self.passed == 0 {
            0
        } else {
            self.total_time_ms / self.passed
        }
    }
}

/// Statistics of one queue run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub iterations_passed: u64,
    pub iterations_failed: u64,
    /// Per action name
    pub actions: BTreeMap<String, ActionExecutionStats>,
}

impl QueueStatistics {
    /// Fold statistics of another agent into this one.
    pub fn merge(&mut self, other: &QueueStatistics) {
        self.iterations_passed += other.iterations_passed;
        self.iterations_failed += other.iterations_failed;
        for (action, stats) in &other.actions {
            let entry = self.actions.entry(action.clone()).or_default();
            entry.passed += stats.passed;
            entry.failed += stats.failed;
            entry.total_time_ms += stats.total_time_ms;
            if entry.transfer_unit.is_none() {
                entry.transfer_unit = stats.transfer_unit.clone();
            }
        }
    }

    /// Percentage of passed iterations; 100 when nothing ran.
    pub fn pass_percentage(&self) -> f64 {
        let total = self.iterations_passed + self.iterations_failed;
        if total == 0 {
            100.0
        } else {
            self.iterations_passed as f64 * 100.0 / total as f64
        }
    }

    /// A zero pass rate requires every iteration to pass.
    pub fn result(&self, pass_rate: u8) -> LoadQueueResult {
        let passed = if pass_rate == 0 {
            self.iterations_failed == 0
        } else {
            self.pass_percentage() >= f64::from(pass_rate)
        };
        if passed {
            LoadQueueResult::Passed
        } else {
            LoadQueueResult::Failed
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LoadQueueState::Finished.is_terminal());
        assert!(LoadQueueState::Cancelled.is_terminal());
        assert!(!LoadQueueState::Paused.is_terminal());
    }

    #[test]
    fn test_result_against_pass_rate() {
        let stats = QueueStatistics {
            iterations_passed: 9,
            iterations_failed: 1,
            actions: BTreeMap::new(),
        };
        assert_eq!(stats.result(90), LoadQueueResult::Passed);
        assert_eq!(stats.result(95), LoadQueueResult::Failed);
        assert_eq!(stats.result(0), LoadQueueResult::Failed);
    }

    #[test]
    fn test_merge_sums_counters() {
        let mut a = QueueStatistics::default();
        a.actions.insert(
            "add".to_string(),
            ActionExecutionStats {
                passed: 2,
                ..Default::default()
            },
        );
        let mut b = QueueStatistics {
            iterations_passed: 3,
            ..Default::default()
        };
        b.actions.insert(
            "add".to_string(),
            ActionExecutionStats {
                passed: 1,
                failed: 1,
                ..Default::default()
            },
        );
        a.merge(&b);
        assert_eq!(a.iterations_passed, 3);
        assert_eq!(a.actions["add"].passed, 3);
        assert_eq!(a.actions["add"].failed, 1);
    }
}
