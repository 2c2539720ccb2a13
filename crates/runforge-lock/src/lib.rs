//! Exclusive per-repo filesystem lock. Lock files are created atomically
//! via a uniquely-named temp file hard-linked into place, so a racing
//! reader never observes a partially written lock, and a crashed owner's
//! lock is reclaimed once its PID is confirmed dead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use runforge_types::RunforgeError;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const LOCK_FILE_NAME: &str = ".runforge.lock";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    task_id: String,
    started_at: DateTime<Utc>,
}

/// RAII handle for an acquired repo lock. Dropping it releases the lock
/// file best-effort; prefer calling `release()` explicitly to observe
/// errors.
pub struct RepoLockGuard {
    path: PathBuf,
    released: bool,
}

impl RepoLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> std::io::Result<()> {
        self.do_release()
    }

    fn do_release(&mut self) -> std::io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        let _ = self.do_release();
    }
}

fn lock_path(repo_dir: &Path) -> PathBuf {
    repo_dir.join(LOCK_FILE_NAME)
}

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    // SAFETY: kill(pid, 0) only probes for existence/permission; it sends
    // no signal.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    // No portable probe; assume alive so we never reclaim a lock we can't
    // verify is abandoned.
    true
}

/// One non-blocking attempt to acquire the lock for `repo_dir` on behalf
/// of `task_id`. Reclaims the lock if the prior owner's PID is dead or the
/// lock file is corrupt.
pub fn acquire(repo_dir: &Path, task_id: &str) -> Result<RepoLockGuard, RunforgeError> {
    let path = lock_path(repo_dir);
    let info = LockInfo {
        pid: std::process::id(),
        task_id: task_id.to_string(),
        started_at: Utc::now(),
    };
    let payload = serde_json::to_string(&info)?;

    let temp_path = repo_dir.join(format!(".runforge.lock.{}.tmp", uuid_like()));
    std::fs::write(&temp_path, &payload)?;

    match std::fs::hard_link(&temp_path, &path) {
        Ok(()) => {
            let _ = std::fs::remove_file(&temp_path);
            Ok(RepoLockGuard {
                path,
                released: false,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let _ = std::fs::remove_file(&temp_path);
            reclaim_or_busy(repo_dir, task_id, &path)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(RunforgeError::Io(e))
        }
    }
}

fn reclaim_or_busy(
    repo_dir: &Path,
    task_id: &str,
    path: &Path,
) -> Result<RepoLockGuard, RunforgeError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<LockInfo>(&contents) {
            Ok(info) => {
                if pid_is_alive(info.pid) {
                    Err(RunforgeError::LockBusy(format!(
                        "repo locked by task {} (pid {})",
                        info.task_id, info.pid
                    )))
                } else {
                    warn!(pid = info.pid, "reclaiming stale repo lock");
                    let _ = std::fs::remove_file(path);
                    acquire(repo_dir, task_id)
                }
            }
            Err(_) => {
                warn!(path = %path.display(), "corrupt repo lock file, removing");
                let _ = std::fs::remove_file(path);
                acquire(repo_dir, task_id)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => acquire(repo_dir, task_id),
        Err(e) => Err(RunforgeError::Io(e)),
    }
}

/// Poll for the lock until acquired or `cancel` fires.
pub async fn wait_and_acquire(
    repo_dir: &Path,
    task_id: &str,
    cancel: &CancellationToken,
) -> Result<RepoLockGuard, RunforgeError> {
    loop {
        match acquire(repo_dir, task_id) {
            Ok(guard) => return Ok(guard),
            Err(RunforgeError::LockBusy(_)) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RunforgeError::Cancelled),
                    _ = tokio::time::sleep(DEFAULT_POLL_INTERVAL) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn uuid_like() -> String {
    format!("{}-{}", std::process::id(), nanos())
}

fn nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempdir().unwrap();
        let guard = acquire(dir.path(), "t1").unwrap();
        assert!(dir.path().join(LOCK_FILE_NAME).exists());
        guard.release().unwrap();
        assert!(!dir.path().join(LOCK_FILE_NAME).exists());
        let _guard2 = acquire(dir.path(), "t2").unwrap();
    }

    #[test]
    fn second_acquire_fails_while_owner_alive() {
        let dir = tempdir().unwrap();
        let _guard = acquire(dir.path(), "t1").unwrap();
        let err = acquire(dir.path(), "t2").unwrap_err();
        assert!(matches!(err, RunforgeError::LockBusy(_)));
    }

    #[test]
    fn reclaims_lock_from_dead_pid() {
        let dir = tempdir().unwrap();
        let dead = LockInfo {
            pid: 999_999,
            task_id: "stale".into(),
            started_at: Utc::now(),
        };
        std::fs::write(
            lock_path(dir.path()),
            serde_json::to_string(&dead).unwrap(),
        )
        .unwrap();
        let guard = acquire(dir.path(), "t2").unwrap();
        assert_eq!(guard.path(), lock_path(dir.path()));
    }

    #[test]
    fn reclaims_corrupt_lock_file() {
        let dir = tempdir().unwrap();
        std::fs::write(lock_path(dir.path()), "not json").unwrap();
        let _guard = acquire(dir.path(), "t1").unwrap();
    }

    #[tokio::test]
    async fn wait_and_acquire_respects_cancellation() {
        let dir = tempdir().unwrap();
        let _held = acquire(dir.path(), "t1").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wait_and_acquire(dir.path(), "t2", &cancel).await;
        assert!(matches!(result, Err(RunforgeError::Cancelled)));
    }
}
