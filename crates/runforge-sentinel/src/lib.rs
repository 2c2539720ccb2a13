//! The sentinel daemon: a single-instance directory watcher that replays
//! dropped incident payloads through the cascade policy and files their
//! outcomes under `completed/` or `failed/`.

mod payload;
mod pidlock;
mod processor;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use runforge_cascade::{Cascade, CascadeConfig};
use runforge_state::{Blacklist, Graylist, ProviderLimiter};
use runforge_types::{RunforgeError, RunnerRegistry};
use tokio_util::sync::CancellationToken;

pub use payload::{Constraints, ConstraintProfile, Observation, Payload, Severity, Target};
pub use pidlock::PidLock;
pub use processor::SentinelPaths;

pub struct SentinelConfig {
    pub root: PathBuf,
    pub repos_root: PathBuf,
    pub registry: RunnerRegistry,
    pub cascade_config: CascadeConfig,
    pub limits: std::collections::HashMap<String, usize>,
}

pub struct Sentinel {
    _lock: PidLock,
    cascade: Cascade,
    paths: SentinelPaths,
}

impl Sentinel {
    /// Acquires the single-instance PID lock and builds the cascade used
    /// to process payloads. Fails if another sentinel instance is alive.
    pub fn start(config: SentinelConfig) -> Result<Self, RunforgeError> {
        let lock_path = config.root.join("sentinel.pid");
        let lock = PidLock::acquire(&lock_path)
            .map_err(|e| RunforgeError::Other(format!("failed to acquire sentinel lock: {e}")))?;

        let paths = SentinelPaths::new(&config.root, &config.repos_root);

        let blacklist = Arc::new(Blacklist::load(config.root.join("blacklist.json")));
        let graylist = Arc::new(Graylist::load(config.root.join("graylist.json")));
        let limiter = Arc::new(ProviderLimiter::new(config.limits));
        let cascade = Cascade::new(config.registry, blacklist, graylist, limiter, config.cascade_config);

        Ok(Sentinel {
            _lock: lock,
            cascade,
            paths,
        })
    }

    /// Runs the watch loop until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), RunforgeError> {
        watch::run(&self.cascade, &self.paths, cancel).await
    }

    pub fn paths(&self) -> &SentinelPaths {
        &self.paths
    }
}
