//! Runner adapters: one per backend CLI (codex, claude, gemini, opencode,
//! script). Each adapter spawns its CLI non-interactively, parses its own
//! newline-delimited JSON event schema, and maps the result onto a
//! `TaskResult`. The spawn/pipe/detector plumbing is shared (`spawn.rs`);
//! only event-schema interpretation and argv construction are
//! adapter-specific.

pub mod adapters;
pub mod env;
pub mod kill;
pub mod spawn;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use runforge_types::{RunnerProfile, Task, TaskResult};
use tokio_util::sync::CancellationToken;

/// Context for a single adapter invocation, derived from the scheduler's
/// per-task context.
pub struct RunContext {
    pub cancel: CancellationToken,
    pub idle_timeout: Duration,
}

#[async_trait]
pub trait RunnerAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        ctx: &RunContext,
        task: &Task,
        profile: &RunnerProfile,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult;
}

pub use adapters::build_adapter;
