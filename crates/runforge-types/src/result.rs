use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskState;

/// Record of one cascade step: a single runner profile's attempt at a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub runner: String,
    pub state: TaskState,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Attempt {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

/// Outcome of running a task through the full cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub state: TaskState,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub runner_used: Option<String>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub resets_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connectivity_error: Option<String>,
    #[serde(default)]
    pub last_msg: Option<String>,
    #[serde(default)]
    pub false_positive: bool,
    #[serde(default)]
    pub auto_committed: bool,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn new(task_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        TaskResult {
            task_id: task_id.into(),
            state: TaskState::Running,
            started_at,
            ended_at: started_at,
            runner_used: None,
            attempts: Vec::new(),
            resets_at: None,
            connectivity_error: None,
            last_msg: None,
            false_positive: false,
            auto_committed: false,
            commit: None,
            error: None,
        }
    }

    pub fn skipped(task_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut r = TaskResult::new(task_id, now);
        r.state = TaskState::Skipped;
        r.ended_at = now;
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_duration_is_non_negative_for_well_formed_timestamps() {
        let start = Utc::now();
        let end = start + chrono::Duration::seconds(5);
        let a = Attempt {
            runner: "primary".into(),
            state: TaskState::Completed,
            started_at: start,
            ended_at: end,
            error: None,
        };
        assert_eq!(a.duration(), chrono::Duration::seconds(5));
    }

    #[test]
    fn skipped_result_has_skipped_state() {
        let now = Utc::now();
        let r = TaskResult::skipped("t1", now);
        assert_eq!(r.state, TaskState::Skipped);
    }
}
