//! Bounded worker-pool scheduler: dispatches ready tasks up to a
//! concurrency budget via a `Semaphore` + `JoinSet`, propagates failure to
//! dependents as `Skipped`, and honors cancellation, per-task timeouts,
//! and fail-fast.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use runforge_cascade::Cascade;
use runforge_graph::Graph;
use runforge_types::{Task, TaskResult, TaskState};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Abstraction over "run one task to completion", so the scheduler's
/// concurrency and ordering logic can be exercised without spawning real
/// subprocesses.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        cancel: CancellationToken,
        task: &Task,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult;
}

/// Adapts the runner `Cascade` to the scheduler's `TaskExecutor` seam;
/// this is the implementation used in production, as opposed to the
/// scripted executors used in scheduler unit tests.
pub struct CascadeExecutor(pub Arc<Cascade>);

#[async_trait]
impl TaskExecutor for CascadeExecutor {
    async fn execute(
        &self,
        cancel: CancellationToken,
        task: &Task,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        self.0.run(&cancel, task, repo_dir, output_dir).await
    }
}

pub struct SchedulerConfig {
    pub workers: usize,
    pub task_timeout: Duration,
    pub fail_fast: bool,
    pub repos_root: PathBuf,
    pub output_root: PathBuf,
}

pub type ProgressSink = Arc<dyn Fn(&str, TaskState) + Send + Sync>;

pub struct Scheduler {
    graph: Graph,
    executor: Arc<dyn TaskExecutor>,
    config: SchedulerConfig,
    progress: Option<ProgressSink>,
}

impl Scheduler {
    pub fn new(
        graph: Graph,
        executor: Arc<dyn TaskExecutor>,
        config: SchedulerConfig,
        progress: Option<ProgressSink>,
    ) -> Self {
        Scheduler {
            graph,
            executor,
            config,
            progress,
        }
    }

    fn notify(&self, id: &str, state: TaskState) {
        if let Some(sink) = &self.progress {
            sink(id, state);
        }
    }

    pub async fn run(&self, run_cancel: CancellationToken) -> HashMap<String, TaskResult> {
        let mut state: HashMap<String, TaskState> = self
            .graph
            .tasks()
            .map(|t| (t.id.clone(), TaskState::Pending))
            .collect();
        let mut results: HashMap<String, TaskResult> = HashMap::new();
        let mut remaining_deps: HashMap<String, usize> = self
            .graph
            .tasks()
            .map(|t| (t.id.clone(), self.graph.deps(&t.id).len()))
            .collect();

        for id in self.graph.roots() {
            state.insert(id, TaskState::Ready);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set: JoinSet<(String, TaskResult)> = JoinSet::new();
        let mut fail_fast_triggered = false;
        let scheduled: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        loop {
            if run_cancel.is_cancelled() {
                break;
            }

            if !fail_fast_triggered || !self.config.fail_fast {
                let mut ready_ids: Vec<String> = state
                    .iter()
                    .filter(|(_, s)| **s == TaskState::Ready)
                    .map(|(id, _)| id.clone())
                    .collect();
                ready_ids.sort_by_key(|id| {
                    let task = self.graph.task(id).expect("ready id exists in graph");
                    (task.priority, task.id.clone())
                });

                for id in ready_ids {
                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => break,
                    };

                    state.insert(id.clone(), TaskState::Running);
                    self.notify(&id, TaskState::Running);

                    let task = self.graph.task(&id).expect("task exists").clone();
                    let repo_dir = self.config.repos_root.join(&task.repo);
                    let output_dir = self.config.output_root.join(&task.id);
                    let executor = self.executor.clone();
                    let task_cancel = run_cancel.child_token();
                    let timeout = self.config.task_timeout;

                    join_set.spawn(async move {
                        let _permit = permit;
                        let result = tokio::time::timeout(
                            timeout,
                            executor.execute(task_cancel.clone(), &task, &repo_dir, &output_dir),
                        )
                        .await;
                        let result = result.unwrap_or_else(|_| timeout_result(&task));
                        (id, result)
                    });
                }
            }

            if run_cancel.is_cancelled() {
                break;
            }

            if join_set.is_empty() {
                if state.values().all(|s| s.is_terminal() || *s == TaskState::Ready) {
                    if state.values().all(|s| *s != TaskState::Ready) {
                        break;
                    }
                    // Ready tasks exist but none could be scheduled this
                    // pass (no idle semaphore permits) and nothing is
                    // in flight: should not happen with workers >= 1, but
                    // guard against a busy spin regardless.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    continue;
                }
                // No task in flight and nothing ready: the remaining
                // pending tasks can never become ready (their
                // dependencies are stuck). Defensive skip.
                let stuck: Vec<String> = state
                    .iter()
                    .filter(|(_, s)| **s == TaskState::Pending)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in stuck {
                    warn!(task = %id, "marking unreachable pending task as skipped");
                    state.insert(id.clone(), TaskState::Skipped);
                    results.insert(id.clone(), TaskResult::skipped(id.clone(), Utc::now()));
                    self.notify(&id, TaskState::Skipped);
                }
                break;
            }

            let completed = tokio::select! {
                next = join_set.join_next() => next,
                _ = run_cancel.cancelled() => None,
            };

            let Some(joined) = completed else {
                continue;
            };
            let (id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "task execution panicked");
                    continue;
                }
            };

            info!(task = %id, state = ?result.state, "task finished");
            state.insert(id.clone(), result.state);
            self.notify(&id, result.state);
            scheduled.lock().unwrap().insert(id.clone());

            if result.state != TaskState::Completed {
                if self.config.fail_fast {
                    fail_fast_triggered = true;
                }
                propagate_skip(&self.graph, &id, &mut state, &mut results, &self.progress);
            } else {
                for dependent in self.graph.dependents(&id) {
                    if let Some(count) = remaining_deps.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                        if *count == 0 && state.get(dependent) == Some(&TaskState::Pending) {
                            state.insert(dependent.clone(), TaskState::Ready);
                        }
                    }
                }
            }
            results.insert(id, result);
        }

        while let Some(joined) = join_set.join_next().await {
            if let Ok((id, result)) = joined {
                state.insert(id.clone(), result.state);
                results.insert(id, result);
            }
        }

        for (id, s) in state {
            if !results.contains_key(&id) && s != TaskState::Completed {
                results.insert(id.clone(), TaskResult::skipped(id, Utc::now()));
            }
        }

        results
    }
}

fn propagate_skip(
    graph: &Graph,
    failed_id: &str,
    state: &mut HashMap<String, TaskState>,
    results: &mut HashMap<String, TaskResult>,
    progress: &Option<ProgressSink>,
) {
    for dependent in graph.transitive_dependents(failed_id) {
        let current = state.get(&dependent).copied().unwrap_or(TaskState::Pending);
        if !current.is_terminal() {
            state.insert(dependent.clone(), TaskState::Skipped);
            results.insert(dependent.clone(), TaskResult::skipped(dependent.clone(), Utc::now()));
            if let Some(sink) = progress {
                sink(&dependent, TaskState::Skipped);
            }
        }
    }
}

fn timeout_result(task: &Task) -> TaskResult {
    let now = Utc::now();
    let mut r = TaskResult::new(task.id.clone(), now);
    r.ended_at = now;
    r.state = TaskState::Failed;
    r.error = Some("task exceeded its maximum runtime".to_string());
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use runforge_types::Task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedExecutor {
        outcomes: HashMap<String, TaskState>,
        concurrent: Arc<AtomicUsize>,
        max_concurrent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _cancel: CancellationToken,
            task: &Task,
            _repo_dir: &Path,
            _output_dir: &Path,
        ) -> TaskResult {
            let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);

            let state = *self.outcomes.get(&task.id).unwrap_or(&TaskState::Completed);
            let now = Utc::now();
            let mut r = TaskResult::new(task.id.clone(), now);
            r.ended_at = now;
            r.state = state;
            r
        }
    }

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, "org/repo", "prompt");
        t.depends_on = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    fn config(dir: &tempfile::TempDir, workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            workers,
            task_timeout: Duration::from_secs(5),
            fail_fast: false,
            repos_root: dir.path().to_path_buf(),
            output_root: dir.path().join("out"),
        }
    }

    #[tokio::test]
    async fn diamond_graph_all_complete() {
        let dir = tempfile::tempdir().unwrap();
        let graph = Graph::build(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ])
        .unwrap();

        let executor = Arc::new(ScriptedExecutor {
            outcomes: HashMap::new(),
            concurrent: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
        });

        let scheduler = Scheduler::new(graph, executor, config(&dir, 4), None);
        let results = scheduler.run(CancellationToken::new()).await;
        assert_eq!(results.len(), 4);
        assert!(results.values().all(|r| r.state == TaskState::Completed));
    }

    #[tokio::test]
    async fn failure_skips_dependents_but_not_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let graph = Graph::build(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ])
        .unwrap();

        let mut outcomes = HashMap::new();
        outcomes.insert("b".to_string(), TaskState::Failed);

        let executor = Arc::new(ScriptedExecutor {
            outcomes,
            concurrent: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
        });

        let scheduler = Scheduler::new(graph, executor, config(&dir, 4), None);
        let results = scheduler.run(CancellationToken::new()).await;

        assert_eq!(results["a"].state, TaskState::Completed);
        assert_eq!(results["b"].state, TaskState::Failed);
        assert_eq!(results["c"].state, TaskState::Completed);
        assert_eq!(results["d"].state, TaskState::Skipped);
    }

    #[tokio::test]
    async fn worker_budget_bounds_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let graph = Graph::build(vec![
            task("a", &[]),
            task("b", &[]),
            task("c", &[]),
            task("d", &[]),
        ])
        .unwrap();

        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let executor = Arc::new(ScriptedExecutor {
            outcomes: HashMap::new(),
            concurrent: Arc::new(AtomicUsize::new(0)),
            max_concurrent: max_concurrent.clone(),
        });

        let scheduler = Scheduler::new(graph, executor, config(&dir, 2), None);
        let results = scheduler.run(CancellationToken::new()).await;
        assert_eq!(results.len(), 4);
        assert!(max_concurrent.load(Ordering::SeqCst) <= 2);
    }
}
