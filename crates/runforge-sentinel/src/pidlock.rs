//! Single-file PID lock guarding the sentinel daemon singleton. A stale
//! PID (owning process no longer alive) is reclaimed automatically.

use std::path::{Path, PathBuf};

#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Ok(existing) = std::fs::read_to_string(&path) {
            if let Ok(pid) = existing.trim().parse::<u32>() {
                if pid_is_alive(pid) {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("sentinel already running with pid {pid}"),
                    ));
                }
            }
            tracing::warn!(path = %path.display(), "reclaiming stale sentinel pid lock");
        }
        std::fs::write(&path, std::process::id().to_string())?;
        Ok(PidLock { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_writes_own_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sentinel.pid");
        let lock = PidLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn reclaims_stale_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sentinel.pid");
        std::fs::write(&path, "999999").unwrap();
        let _lock = PidLock::acquire(&path).unwrap();
    }

    #[test]
    fn drop_removes_lock_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sentinel.pid");
        {
            let _lock = PidLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
