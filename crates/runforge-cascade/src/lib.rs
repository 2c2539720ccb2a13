//! Cascade policy: tries a task's chosen runner, then its fallbacks in
//! order, skipping blacklisted and (in fallback position) graylisted
//! profiles, recording a blacklist entry on rate limit and a graylist
//! entry on a false-positive completion.

mod commit;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use runforge_lock::wait_and_acquire;
use runforge_runners::{build_adapter, RunContext};
use runforge_state::{Blacklist, Graylist, ProviderLimiter};
use runforge_types::{RunnerRegistry, Task, TaskResult, TaskState};
use tokio_util::sync::CancellationToken;

pub use commit::{auto_commit, commit_message, commit_type, has_uncommitted_changes};

const DEFAULT_BLACKLIST_WINDOW: chrono::Duration = chrono::Duration::minutes(30);

pub struct CascadeConfig {
    pub idle_timeout: Duration,
    pub auto_commit: bool,
    /// Open question (a): whether a graylisted primary runner that is also
    /// the only candidate should still be attempted. Decided `true`
    /// (attempt it rather than fail the whole task), but left
    /// configurable since the source material does not settle it.
    pub allow_graylisted_primary_if_sole_candidate: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        CascadeConfig {
            idle_timeout: Duration::from_secs(300),
            auto_commit: true,
            allow_graylisted_primary_if_sole_candidate: true,
        }
    }
}

pub struct Cascade {
    registry: RunnerRegistry,
    blacklist: Arc<Blacklist>,
    graylist: Arc<Graylist>,
    limiter: Arc<ProviderLimiter>,
    config: CascadeConfig,
}

impl Cascade {
    pub fn new(
        registry: RunnerRegistry,
        blacklist: Arc<Blacklist>,
        graylist: Arc<Graylist>,
        limiter: Arc<ProviderLimiter>,
        config: CascadeConfig,
    ) -> Self {
        Cascade {
            registry,
            blacklist,
            graylist,
            limiter,
            config,
        }
    }

    fn build_candidates(&self, task: &Task) -> Vec<String> {
        let primary = task
            .runner
            .clone()
            .or_else(|| self.registry.default_runner.clone());

        let fallback_source = if !task.fallbacks.is_empty() {
            &task.fallbacks
        } else {
            &self.registry.default_fallbacks
        };

        let mut ordered: Vec<String> = Vec::new();
        if let Some(p) = &primary {
            ordered.push(p.clone());
        }
        for f in fallback_source {
            if Some(f) != primary.as_ref() && !ordered.contains(f) {
                ordered.push(f.clone());
            }
        }

        let mut candidates: Vec<String> = ordered
            .iter()
            .enumerate()
            .filter(|(idx, name)| {
                let Some(profile) = self.registry.get(name) else {
                    return false;
                };
                if self.blacklist.is_blocked(name) {
                    return false;
                }
                if *idx > 0 && self.graylist.is_graylisted(name, profile.model.as_deref()) {
                    return false;
                }
                true
            })
            .map(|(_, name)| name.clone())
            .collect();

        if candidates.is_empty() && self.config.allow_graylisted_primary_if_sole_candidate {
            if let Some(p) = &primary {
                if self.registry.contains(p) && !self.blacklist.is_blocked(p) {
                    candidates.push(p.clone());
                }
            }
        }

        candidates
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        task: &Task,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        let candidates = self.build_candidates(task);
        let mut last_result: Option<TaskResult> = None;

        for (idx, name) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let Some(profile) = self.registry.get(name).cloned() else {
                continue;
            };

            let _permit = self.limiter.acquire(name).await;
            let lock = match wait_and_acquire(repo_dir, &task.id, cancel).await {
                Ok(g) => g,
                Err(_) => {
                    continue;
                }
            };

            let adapter = build_adapter(profile.kind);
            let ctx = RunContext {
                cancel: cancel.clone(),
                idle_timeout: self.config.idle_timeout,
            };
            let attempt_dir = output_dir.join(format!("attempt-{idx}-{name}"));

            let mut result = adapter.run(&ctx, task, &profile, repo_dir, &attempt_dir).await;
            drop(lock);

            if result.false_positive {
                let _ = self.graylist.add(name, profile.model.as_deref(), "false_positive");
            }

            match result.state {
                TaskState::RateLimited => {
                    let until = result
                        .resets_at
                        .unwrap_or_else(|| Utc::now() + DEFAULT_BLACKLIST_WINDOW);
                    let _ = self.blacklist.block(name, until);
                    last_result = Some(result);
                    continue;
                }
                TaskState::Completed => {
                    if self.config.auto_commit && has_uncommitted_changes(repo_dir).await {
                        if let Some(commit) = auto_commit(repo_dir, task).await {
                            result.auto_committed = true;
                            result.commit = Some(commit);
                        }
                    }
                    return result;
                }
                _ => {
                    last_result = Some(result);
                    continue;
                }
            }
        }

        last_result.unwrap_or_else(|| cascade_exhausted(task))
    }
}

fn cascade_exhausted(task: &Task) -> TaskResult {
    let now = Utc::now();
    let mut r = TaskResult::new(task.id.clone(), now);
    r.ended_at = now;
    r.state = TaskState::Failed;
    r.error = Some(format!("cascade exhausted for task {}", task.id));
    r
}
