//! Cross-run persistent state: the runner blacklist and graylist, the
//! per-task state tracker, and a runtime-only per-profile concurrency
//! limiter. Every persisted store is written atomically (temp file then
//! rename) so a crash never leaves a half-written document behind.

pub mod atomic;
pub mod blacklist;
pub mod graylist;
pub mod limiter;
pub mod tracker;

pub use blacklist::Blacklist;
pub use graylist::{Graylist, GraylistKey};
pub use limiter::{LimiterGuard, ProviderLimiter};
pub use tracker::StateTracker;

use std::path::PathBuf;

/// `~/.runforge` unless overridden, matching the teacher's `dirs`-based
/// state-dir resolution.
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".runforge")
}
