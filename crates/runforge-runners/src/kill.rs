//! Process-tree cleanup. On Unix the child is placed in its own process
//! group (via `setsid` in a `pre_exec` hook) so a single `kill(-pgid)`
//! takes down the whole subtree a CLI agent may have spawned. Non-Unix
//! targets fall back to killing only the process leader.

#[cfg(unix)]
pub fn detach_into_own_group(cmd: &mut tokio::process::Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: setsid() is async-signal-safe and only affects the child
    // after fork, before exec.
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub fn detach_into_own_group(_cmd: &mut tokio::process::Command) {}

#[cfg(unix)]
pub fn kill_tree(pid: u32) {
    // SAFETY: kill() with a negative pid targets the process group; this
    // is the standard way to signal a subtree rooted at a setsid() leader.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub fn kill_tree(pid: u32) {
    // Best effort: no portable process-group kill here, so only the
    // leader is signalled.
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .status();
}
