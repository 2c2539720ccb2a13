//! Runner graylist: a permanent (never time-decaying) demotion of a
//! `(runner, model)` pair after an observed false-positive completion. A
//! wildcard entry (empty model) matches any model for that runner.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use runforge_types::RunforgeError;
use serde::{Deserialize, Serialize};

use crate::atomic::atomic_write;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GraylistKey {
    pub runner: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraylistEntry {
    runner: String,
    #[serde(default)]
    model: String,
    reason: String,
    added_at: DateTime<Utc>,
}

pub struct Graylist {
    path: PathBuf,
    entries: Mutex<HashSet<GraylistKey>>,
}

impl Graylist {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw: Vec<GraylistEntry> = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt graylist file");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        let entries = raw
            .into_iter()
            .map(|e| GraylistKey {
                runner: e.runner,
                model: e.model,
            })
            .collect();
        Graylist {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn add(&self, runner: &str, model: Option<&str>, reason: &str) -> Result<(), RunforgeError> {
        {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(GraylistKey {
                runner: runner.to_string(),
                model: model.unwrap_or_default().to_string(),
            });
        }
        let _ = reason;
        self.persist()
    }

    pub fn is_graylisted(&self, runner: &str, model: Option<&str>) -> bool {
        let entries = self.entries.lock().unwrap();
        let wildcard = GraylistKey {
            runner: runner.to_string(),
            model: String::new(),
        };
        if entries.contains(&wildcard) {
            return true;
        }
        if let Some(model) = model {
            let exact = GraylistKey {
                runner: runner.to_string(),
                model: model.to_string(),
            };
            return entries.contains(&exact);
        }
        false
    }

    fn persist(&self) -> Result<(), RunforgeError> {
        let entries = self.entries.lock().unwrap();
        let serializable: Vec<GraylistEntry> = entries
            .iter()
            .map(|k| GraylistEntry {
                runner: k.runner.clone(),
                model: k.model.clone(),
                reason: "false_positive".to_string(),
                added_at: Utc::now(),
            })
            .collect();
        let payload = serde_json::to_string_pretty(&serializable)?;
        atomic_write(&self.path, &payload)
    }
}

pub fn default_path(state_dir: &Path) -> PathBuf {
    state_dir.join("graylist.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn specific_pair_is_graylisted() {
        let dir = tempdir().unwrap();
        let gl = Graylist::load(dir.path().join("graylist.json"));
        gl.add("primary", Some("gpt-5"), "false_positive").unwrap();
        assert!(gl.is_graylisted("primary", Some("gpt-5")));
        assert!(!gl.is_graylisted("primary", Some("gpt-5-mini")));
    }

    #[test]
    fn wildcard_entry_matches_any_model() {
        let dir = tempdir().unwrap();
        let gl = Graylist::load(dir.path().join("graylist.json"));
        gl.add("primary", None, "false_positive").unwrap();
        assert!(gl.is_graylisted("primary", Some("anything")));
        assert!(gl.is_graylisted("primary", None));
    }

    #[test]
    fn entries_never_decay_across_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graylist.json");
        let gl = Graylist::load(path.clone());
        gl.add("primary", Some("gpt-5"), "false_positive").unwrap();
        let reloaded = Graylist::load(path);
        assert!(reloaded.is_graylisted("primary", Some("gpt-5")));
    }
}
