use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::result::TaskResult;
use crate::task::TaskState;

/// Aggregate outcome of a single scheduler run, serialized as the final
/// `RunReport` artifact. `counts` and `duration_ms` are derived from
/// `results`/`ended_at` but carried as real fields (not just methods) so
/// the emitted JSON reports them without a downstream reader having to
/// recompute them from `results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub task_file: String,
    pub worker_budget: usize,
    pub repos_root: String,
    pub results: HashMap<String, TaskResult>,
    #[serde(default)]
    pub counts: HashMap<TaskState, usize>,
    #[serde(default)]
    pub duration_ms: i64,
}

impl RunReport {
    pub fn new(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        task_file: impl Into<String>,
        worker_budget: usize,
        repos_root: impl Into<String>,
    ) -> Self {
        RunReport {
            run_id: run_id.into(),
            started_at,
            ended_at: started_at,
            task_file: task_file.into(),
            worker_budget,
            repos_root: repos_root.into(),
            results: HashMap::new(),
            counts: HashMap::new(),
            duration_ms: 0,
        }
    }

    /// Sets `results` and `ended_at`, then recomputes `counts` and
    /// `duration_ms` from them. Call this instead of assigning `results`
    /// directly so the derived fields never go stale.
    pub fn finish(&mut self, results: HashMap<String, TaskResult>, ended_at: DateTime<Utc>) {
        self.results = results;
        self.ended_at = ended_at;
        self.counts = self.counts_by_state();
        self.duration_ms = self.wall_clock().num_milliseconds();
    }

    pub fn counts_by_state(&self) -> HashMap<TaskState, usize> {
        let mut out: HashMap<TaskState, usize> = HashMap::new();
        for r in self.results.values() {
            *out.entry(r.state).or_insert(0) += 1;
        }
        out
    }

    pub fn all_completed(&self) -> bool {
        self.results
            .values()
            .all(|r| r.state == TaskState::Completed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_completed() {
            0
        } else {
            1
        }
    }

    pub fn wall_clock(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}
