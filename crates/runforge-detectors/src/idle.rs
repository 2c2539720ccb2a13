//! Idle-timeout monitor: wraps a subprocess's stdout conceptually by
//! tracking the time since the last non-empty read. `touch()` is called by
//! the adapter's line-reading loop on every line; `watch()` runs as a
//! background task that fires the cancel callback once the configured
//! timeout elapses with no `touch()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct IdleMonitor {
    timeout: Duration,
    last_activity: Mutex<Instant>,
    idled: AtomicBool,
}

impl IdleMonitor {
    /// A zero timeout disables the monitor entirely.
    pub fn new(timeout: Duration) -> Self {
        IdleMonitor {
            timeout,
            last_activity: Mutex::new(Instant::now()),
            idled: AtomicBool::new(false),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn idled(&self) -> bool {
        self.idled.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn elapsed_since_activity(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    /// Poll until the idle timeout elapses or `cancel` fires (whichever
    /// happens first is signalled), then mark `idled` and cancel the
    /// token. No-op forever if `timeout` is zero.
    pub async fn watch(&self, cancel: CancellationToken) {
        if self.timeout.is_zero() {
            cancel.cancelled().await;
            return;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    if self.elapsed_since_activity() >= self.timeout {
                        self.idled.store(true, Ordering::SeqCst);
                        cancel.cancel();
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout_with_no_touch() {
        let monitor = IdleMonitor::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                monitor.watch(cancel).await;
                monitor
            }
        });
        tokio::time::advance(Duration::from_millis(150)).await;
        let monitor = watcher.await.unwrap();
        assert!(monitor.idled());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_the_timer() {
        let monitor = std::sync::Arc::new(IdleMonitor::new(Duration::from_millis(100)));
        let cancel = CancellationToken::new();
        let watch_handle = tokio::spawn({
            let monitor = monitor.clone();
            let cancel = cancel.clone();
            async move {
                monitor.watch(cancel).await;
            }
        });
        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(60)).await;
            monitor.touch();
        }
        cancel.cancel();
        watch_handle.await.unwrap();
        assert!(!monitor.idled());
    }

    #[tokio::test]
    async fn zero_timeout_disables_monitor() {
        let monitor = IdleMonitor::new(Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();
        monitor.watch(cancel).await;
        assert!(!monitor.idled());
    }
}
