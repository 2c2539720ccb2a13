//! Runner blacklist: a time-bounded per-runner exclusion, persisted as a
//! JSON array under the state directory. Blocking only ever extends an
//! existing entry's expiry, never shortens it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use runforge_types::RunforgeError;
use serde::{Deserialize, Serialize};

use crate::atomic::atomic_write;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlacklistEntry {
    runner: String,
    resets_at: DateTime<Utc>,
}

pub struct Blacklist {
    path: PathBuf,
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Blacklist {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw: Vec<BlacklistEntry> = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt blacklist file");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        let now = Utc::now();
        let entries = raw
            .into_iter()
            .filter(|e| e.resets_at > now)
            .map(|e| (e.runner, e.resets_at))
            .collect();

        Blacklist {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Extend (never shorten) the blacklist window for `runner`.
    pub fn block(&self, runner: &str, until: DateTime<Utc>) -> Result<(), RunforgeError> {
        {
            let mut entries = self.entries.lock().unwrap();
            let current = entries.get(runner).copied();
            if current.map(|c| until > c).unwrap_or(true) {
                entries.insert(runner.to_string(), until);
            }
        }
        self.persist()
    }

    pub fn is_blocked(&self, runner: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(runner)
            .map(|until| *until > Utc::now())
            .unwrap_or(false)
    }

    fn persist(&self) -> Result<(), RunforgeError> {
        let entries = self.entries.lock().unwrap();
        let serializable: Vec<BlacklistEntry> = entries
            .iter()
            .map(|(runner, resets_at)| BlacklistEntry {
                runner: runner.clone(),
                resets_at: *resets_at,
            })
            .collect();
        let payload = serde_json::to_string_pretty(&serializable)?;
        atomic_write(&self.path, &payload)
    }
}

pub fn default_path(state_dir: &Path) -> PathBuf {
    state_dir.join("blacklist.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn newly_blocked_runner_is_blocked() {
        let dir = tempdir().unwrap();
        let bl = Blacklist::load(dir.path().join("blacklist.json"));
        assert!(!bl.is_blocked("primary"));
        bl.block("primary", Utc::now() + chrono::Duration::minutes(5))
            .unwrap();
        assert!(bl.is_blocked("primary"));
    }

    #[test]
    fn block_never_shortens_existing_window() {
        let dir = tempdir().unwrap();
        let bl = Blacklist::load(dir.path().join("blacklist.json"));
        let far = Utc::now() + chrono::Duration::hours(1);
        let near = Utc::now() + chrono::Duration::minutes(1);
        bl.block("primary", far).unwrap();
        bl.block("primary", near).unwrap();
        // still blocked long after `near` would have expired
        assert!(bl.is_blocked("primary"));
    }

    #[test]
    fn reload_drops_expired_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        let bl = Blacklist::load(path.clone());
        bl.block("primary", Utc::now() - chrono::Duration::seconds(1))
            .unwrap();
        let reloaded = Blacklist::load(path);
        assert!(!reloaded.is_blocked("primary"));
    }

    #[test]
    fn corrupt_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist.json");
        std::fs::write(&path, "not json").unwrap();
        let bl = Blacklist::load(path);
        assert!(!bl.is_blocked("primary"));
    }
}
