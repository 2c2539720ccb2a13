use std::path::Path;

use chrono::{DateTime, Utc};
use runforge_types::{Attempt, RunnerProfile, Task, TaskResult, TaskState};

use crate::spawn::{run_subprocess, SpawnSpec};
use crate::RunContext;

/// What an adapter's event-schema parser concluded after reading the full
/// `events.jsonl` for one attempt.
pub struct EventInterpretation {
    pub failed: bool,
    pub last_msg: Option<String>,
}

/// Shared execution path for every adapter: spawn, pipe, apply detectors,
/// then let the adapter interpret its own event schema. `expects_events`
/// enables the false-positive guard (clean exit, zero events).
pub async fn execute(
    ctx: &RunContext,
    task: &Task,
    profile: &RunnerProfile,
    repo_dir: &Path,
    output_dir: &Path,
    program: String,
    args: Vec<String>,
    expects_events: bool,
    interpret: impl FnOnce(&[String]) -> EventInterpretation,
) -> TaskResult {
    let started_at = Utc::now();
    let _ = tokio::fs::create_dir_all(output_dir).await;
    let events_path = output_dir.join("events.jsonl");
    let stderr_path = output_dir.join("stderr.log");

    let env = match crate::env::build_env(&profile.env) {
        Ok(env) => env,
        Err(e) => return error_result(task, profile, started_at, &e.to_string()),
    };

    let spec = SpawnSpec {
        program,
        args,
        cwd: repo_dir.to_path_buf(),
        env,
    };

    let outcome = match run_subprocess(
        spec,
        ctx.idle_timeout,
        ctx.cancel.clone(),
        &events_path,
        &stderr_path,
    )
    .await
    {
        Ok(o) => o,
        Err(e) => return error_result(task, profile, started_at, &e.to_string()),
    };

    let ended_at = Utc::now();
    let mut result = TaskResult::new(task.id.clone(), started_at);
    result.ended_at = ended_at;
    result.runner_used = Some(profile.name.clone());

    if outcome.idled {
        result.state = TaskState::Failed;
        result.error = Some(format!(
            "idle timeout: no output for {:?}",
            ctx.idle_timeout
        ));
    } else if let Some(reason) = outcome.connectivity_reason.clone() {
        result.state = TaskState::Failed;
        result.connectivity_error = Some(reason.clone());
        result.error = Some(reason);
    } else if outcome.rate_limited {
        result.state = TaskState::RateLimited;
        result.resets_at = outcome.resets_at;
        result.error = Some("rate limited".to_string());
    } else if expects_events && outcome.event_lines.is_empty() && outcome.exit_success {
        result.state = TaskState::Failed;
        result.false_positive = true;
        result.error = Some("runner exited cleanly with no events".to_string());
    } else {
        let interpretation = interpret(&outcome.event_lines);
        result.last_msg = interpretation.last_msg;
        if interpretation.failed || !outcome.exit_success {
            result.state = TaskState::Failed;
            result.error = Some(if !outcome.stderr_tail.trim().is_empty() {
                outcome.stderr_tail.clone()
            } else {
                "task failed".to_string()
            });
        } else {
            result.state = TaskState::Completed;
        }
    }

    result.attempts.push(Attempt {
        runner: profile.name.clone(),
        state: result.state,
        started_at,
        ended_at,
        error: result.error.clone(),
    });
    result
}

fn error_result(
    task: &Task,
    profile: &RunnerProfile,
    started_at: DateTime<Utc>,
    msg: &str,
) -> TaskResult {
    let ended_at = Utc::now();
    let mut r = TaskResult::new(task.id.clone(), started_at);
    r.ended_at = ended_at;
    r.state = TaskState::Failed;
    r.error = Some(msg.to_string());
    r.runner_used = Some(profile.name.clone());
    r.attempts.push(Attempt {
        runner: profile.name.clone(),
        state: TaskState::Failed,
        started_at,
        ended_at,
        error: Some(msg.to_string()),
    });
    r
}
