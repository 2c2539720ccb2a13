//! Shared subprocess execution core used by every runner adapter: spawns
//! the backend CLI in its own process group, pipes stdout into
//! `events.jsonl` while feeding the idle monitor, pipes stderr into
//! `stderr.log` while feeding the rate-limit and connectivity detectors,
//! and reacts to whichever detector fires first by cancelling the whole
//! subtree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Utc};
use runforge_detectors::{ConnectivityDetector, IdleMonitor, RateLimitDetector};
use runforge_types::RunforgeError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::kill;

pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

/// Why the subprocess's execution ended, in the priority order the
/// adapters use to pick a final `TaskState`: idle > connectivity > rate
/// limit > whatever the event stream / exit code says.
#[derive(Debug)]
pub struct SpawnOutcome {
    pub exit_success: bool,
    pub event_lines: Vec<String>,
    pub idled: bool,
    pub connectivity_reason: Option<String>,
    pub rate_limited: bool,
    pub resets_at: Option<DateTime<Utc>>,
    pub stderr_tail: String,
}

pub async fn run_subprocess(
    spec: SpawnSpec,
    idle_timeout: std::time::Duration,
    parent_cancel: CancellationToken,
    events_path: &Path,
    stderr_path: &Path,
) -> Result<SpawnOutcome, RunforgeError> {
    let child_cancel = parent_cancel.child_token();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    kill::detach_into_own_group(&mut cmd);

    let mut child = cmd
        .spawn()
        .map_err(|e| RunforgeError::SpawnFailure(e.to_string()))?;
    let pid = child.id().ok_or_else(|| {
        RunforgeError::SpawnFailure("subprocess exited before a pid was available".into())
    })?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let idle_monitor = std::sync::Arc::new(IdleMonitor::new(idle_timeout));
    let rate_limit = std::sync::Arc::new(RateLimitDetector::new());
    let connectivity = std::sync::Arc::new(ConnectivityDetector::new());

    let idle_task = tokio::spawn({
        let monitor = idle_monitor.clone();
        let cancel = child_cancel.clone();
        async move { monitor.watch(cancel).await }
    });

    let stdout_task = tokio::spawn(pump_stdout(
        stdout,
        events_path.to_path_buf(),
        idle_monitor.clone(),
    ));

    let stderr_task = tokio::spawn(pump_stderr(
        stderr,
        stderr_path.to_path_buf(),
        rate_limit.clone(),
        connectivity.clone(),
        child_cancel.clone(),
    ));

    let exit_success = tokio::select! {
        status = child.wait() => {
            status.map(|s| s.success()).unwrap_or(false)
        }
        _ = child_cancel.cancelled() => {
            kill::kill_tree(pid);
            let _ = child.wait().await;
            false
        }
    };

    child_cancel.cancel();
    let _ = idle_task.await;
    let event_lines = stdout_task.await.unwrap_or_default();
    let stderr_tail = stderr_task.await.unwrap_or_default();

    Ok(SpawnOutcome {
        exit_success,
        event_lines,
        idled: idle_monitor.idled(),
        connectivity_reason: connectivity.reason(),
        rate_limited: rate_limit.detected(),
        resets_at: rate_limit.resets_at(),
        stderr_tail,
    })
}

const MAX_LINE_BYTES: usize = 1024 * 1024;

async fn pump_stdout(
    stdout: tokio::process::ChildStdout,
    events_path: PathBuf,
    idle_monitor: std::sync::Arc<IdleMonitor>,
) -> Vec<String> {
    let mut reader = BufReader::with_capacity(64 * 1024, stdout);
    let mut file = match tokio::fs::File::create(&events_path).await {
        Ok(f) => Some(f),
        Err(e) => {
            tracing::warn!(path = %events_path.display(), error = %e, "failed to create events file");
            None
        }
    };

    let mut lines = Vec::new();
    loop {
        let mut buf = String::new();
        match reader.read_line(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.len() > MAX_LINE_BYTES {
                    tracing::warn!(len = buf.len(), "truncating oversized event line");
                    buf.truncate(MAX_LINE_BYTES);
                }
                if !buf.trim().is_empty() {
                    idle_monitor.touch();
                }
                if let Some(f) = file.as_mut() {
                    let _ = f.write_all(buf.as_bytes()).await;
                }
                lines.push(buf.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "error reading subprocess stdout");
                break;
            }
        }
    }
    lines
}

async fn pump_stderr(
    stderr: tokio::process::ChildStderr,
    stderr_path: PathBuf,
    rate_limit: std::sync::Arc<RateLimitDetector>,
    connectivity: std::sync::Arc<ConnectivityDetector>,
    cancel: CancellationToken,
) -> String {
    let mut reader = BufReader::with_capacity(64 * 1024, stderr);
    let mut file = match tokio::fs::File::create(&stderr_path).await {
        Ok(f) => Some(f),
        Err(e) => {
            tracing::warn!(path = %stderr_path.display(), error = %e, "failed to create stderr file");
            None
        }
    };

    let mut tail = String::new();
    loop {
        let mut buf = String::new();
        match reader.read_line(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if let Some(f) = file.as_mut() {
                    let _ = f.write_all(buf.as_bytes()).await;
                }
                let rl_fired = rate_limit.scan_line(&buf);
                let conn_fired = connectivity.scan_line(&buf);
                if rl_fired || conn_fired {
                    cancel.cancel();
                }
                tail.push_str(&buf);
                if tail.len() > 8192 {
                    let cut = tail.len() - 8192;
                    tail.drain(0..cut);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "error reading subprocess stderr");
                break;
            }
        }
    }
    runforge_detectors::redact(&tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn runs_echo_and_captures_events() {
        let dir = tempdir().unwrap();
        let events_path = dir.path().join("events.jsonl");
        let stderr_path = dir.path().join("stderr.log");

        let spec = SpawnSpec {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo '{\"type\":\"hello\"}'".into(),
            ],
            cwd: dir.path().to_path_buf(),
            env: HashMap::new(),
        };

        let outcome = run_subprocess(
            spec,
            Duration::from_secs(5),
            CancellationToken::new(),
            &events_path,
            &stderr_path,
        )
        .await
        .unwrap();

        assert!(outcome.exit_success);
        assert_eq!(outcome.event_lines.len(), 1);
        assert!(!outcome.idled);
        assert!(!outcome.rate_limited);
    }

    #[tokio::test]
    async fn detects_rate_limit_on_stderr() {
        let dir = tempdir().unwrap();
        let events_path = dir.path().join("events.jsonl");
        let stderr_path = dir.path().join("stderr.log");

        let spec = SpawnSpec {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "echo 'usage_limit_reached' 1>&2; sleep 2".into(),
            ],
            cwd: dir.path().to_path_buf(),
            env: HashMap::new(),
        };

        let outcome = run_subprocess(
            spec,
            Duration::from_secs(5),
            CancellationToken::new(),
            &events_path,
            &stderr_path,
        )
        .await
        .unwrap();

        assert!(outcome.rate_limited);
        assert!(!outcome.exit_success);
    }
}
