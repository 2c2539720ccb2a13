//! Persistent per-task completion ledger enabling resumption across runs.
//! Filtering (dropping already-completed, and optionally failed/
//! interrupted, tasks) must happen before the dependency graph is built so
//! the surviving task set never references a dropped id.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use runforge_types::{RunforgeError, StateEntry, StateStatus, Task};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::atomic::atomic_write;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    tasks: HashMap<String, StateEntry>,
}

pub struct StateTracker {
    path: PathBuf,
    doc: Mutex<StateDocument>,
}

impl StateTracker {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt state file");
                StateDocument::default()
            }),
            Err(_) => StateDocument::default(),
        };
        StateTracker {
            path,
            doc: Mutex::new(doc),
        }
    }

    pub fn mark_started(&self, task_id: &str, run_id: &str) -> Result<(), RunforgeError> {
        {
            let mut doc = self.doc.lock().unwrap();
            doc.tasks.insert(
                task_id.to_string(),
                StateEntry {
                    status: StateStatus::InProgress,
                    started: Utc::now(),
                    finished: None,
                    runner: None,
                    commit: None,
                    error: None,
                    run_id: run_id.to_string(),
                },
            );
        }
        self.persist()
    }

    pub fn mark_completed(
        &self,
        task_id: &str,
        runner: &str,
        commit: Option<&str>,
    ) -> Result<(), RunforgeError> {
        self.finish(task_id, StateStatus::Completed, Some(runner), commit, None)
    }

    pub fn mark_failed(&self, task_id: &str, error: &str) -> Result<(), RunforgeError> {
        self.finish(task_id, StateStatus::Failed, None, None, Some(error))
    }

    fn finish(
        &self,
        task_id: &str,
        status: StateStatus,
        runner: Option<&str>,
        commit: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), RunforgeError> {
        {
            let mut doc = self.doc.lock().unwrap();
            let run_id = doc
                .tasks
                .get(task_id)
                .map(|e| e.run_id.clone())
                .unwrap_or_default();
            let started = doc
                .tasks
                .get(task_id)
                .map(|e| e.started)
                .unwrap_or_else(Utc::now);
            doc.tasks.insert(
                task_id.to_string(),
                StateEntry {
                    status,
                    started,
                    finished: Some(Utc::now()),
                    runner: runner.map(|s| s.to_string()),
                    commit: commit.map(|s| s.to_string()),
                    error: error.map(|s| s.to_string()),
                    run_id,
                },
            );
        }
        self.persist()
    }

    pub fn entry(&self, task_id: &str) -> Option<StateEntry> {
        self.doc.lock().unwrap().tasks.get(task_id).cloned()
    }

    /// Convert any `InProgress` entry belonging to a run that is no longer
    /// live into `Interrupted`. `live_run_ids` names runs still executing
    /// (normally empty at process startup).
    pub fn recover_interrupted(&self, live_run_ids: &HashSet<String>) -> Result<(), RunforgeError> {
        let mut changed = false;
        {
            let mut doc = self.doc.lock().unwrap();
            for entry in doc.tasks.values_mut() {
                if entry.status == StateStatus::InProgress && !live_run_ids.contains(&entry.run_id) {
                    entry.status = StateStatus::Interrupted;
                    entry.finished = Some(Utc::now());
                    changed = true;
                }
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), RunforgeError> {
        let doc = self.doc.lock().unwrap();
        let payload = serde_json::to_string_pretty(&*doc)?;
        atomic_write(&self.path, &payload)
    }

    /// Drop tasks already accounted for by prior runs, and strip their ids
    /// from every surviving task's `depends_on`. `Completed` entries are
    /// always dropped; `Failed`/`Interrupted` entries are dropped unless
    /// `retry` is set.
    pub fn filter(&self, tasks: Vec<Task>, retry: bool) -> Vec<Task> {
        let doc = self.doc.lock().unwrap();
        let mut dropped: HashSet<String> = HashSet::new();
        for task in &tasks {
            if let Some(entry) = doc.tasks.get(&task.id) {
                let drop = match entry.status {
                    StateStatus::Completed => true,
                    StateStatus::Failed | StateStatus::Interrupted => !retry,
                    StateStatus::InProgress => false,
                };
                if drop {
                    dropped.insert(task.id.clone());
                }
            }
        }

        tasks
            .into_iter()
            .filter(|t| !dropped.contains(&t.id))
            .map(|mut t| {
                t.depends_on.retain(|d| !dropped.contains(d));
                t
            })
            .collect()
    }
}

pub fn default_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("state.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, "org/repo", "prompt");
        t.depends_on = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    #[test]
    fn completed_tasks_are_always_dropped() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::load(dir.path().join("state.json"));
        tracker.mark_started("a", "run1").unwrap();
        tracker.mark_completed("a", "primary", None).unwrap();

        let tasks = vec![task("a", &[]), task("b", &["a"])];
        let filtered = tracker.filter(tasks, false);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "b");
        assert!(filtered[0].depends_on.is_empty());
    }

    #[test]
    fn failed_tasks_dropped_unless_retry() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::load(dir.path().join("state.json"));
        tracker.mark_started("a", "run1").unwrap();
        tracker.mark_failed("a", "boom").unwrap();

        let tasks = vec![task("a", &[])];
        assert_eq!(tracker.filter(tasks.clone(), false).len(), 0);
        assert_eq!(tracker.filter(tasks, true).len(), 1);
    }

    #[test]
    fn recover_interrupted_converts_stale_in_progress() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let tracker = StateTracker::load(path.clone());
        tracker.mark_started("a", "dead-run").unwrap();

        let reloaded = StateTracker::load(path);
        reloaded.recover_interrupted(&HashSet::new()).unwrap();
        let entry = reloaded.entry("a").unwrap();
        assert_eq!(entry.status, StateStatus::Interrupted);
    }

    #[test]
    fn round_trip_save_and_load_is_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let tracker = StateTracker::load(path.clone());
        tracker.mark_started("a", "run1").unwrap();
        tracker
            .mark_completed("a", "primary", Some("abc123"))
            .unwrap();

        let reloaded = StateTracker::load(path);
        let entry = reloaded.entry("a").unwrap();
        assert_eq!(entry.status, StateStatus::Completed);
        assert_eq!(entry.commit.as_deref(), Some("abc123"));
    }
}
