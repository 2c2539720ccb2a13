use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which backend CLI a runner profile drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    Codex,
    Claude,
    Gemini,
    Opencode,
    Script,
}

impl RunnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerKind::Codex => "codex",
            RunnerKind::Claude => "claude",
            RunnerKind::Gemini => "gemini",
            RunnerKind::Opencode => "opencode",
            RunnerKind::Script => "script",
        }
    }
}

impl std::str::FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "codex" => Ok(RunnerKind::Codex),
            "claude" => Ok(RunnerKind::Claude),
            "gemini" => Ok(RunnerKind::Gemini),
            "opencode" => Ok(RunnerKind::Opencode),
            "script" => Ok(RunnerKind::Script),
            other => Err(format!("unknown runner backend: {other}")),
        }
    }
}

/// A named runner configuration: which backend, which model, which
/// environment overrides, and whether it is excluded from the cascade by
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerProfile {
    pub name: String,
    pub kind: RunnerKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub native_profile: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub data_collection: bool,
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub command: Option<String>,
}

impl RunnerProfile {
    pub fn new(name: impl Into<String>, kind: RunnerKind) -> Self {
        RunnerProfile {
            name: name.into(),
            kind,
            model: None,
            native_profile: None,
            env: HashMap::new(),
            max_concurrency: None,
            data_collection: false,
            free: false,
            command: None,
        }
    }
}

/// Registry of known runner profiles plus the default runner/fallback
/// selection applied when a task omits them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerRegistry {
    pub default_runner: Option<String>,
    #[serde(default)]
    pub default_fallbacks: Vec<String>,
    pub profiles: HashMap<String, RunnerProfile>,
}

impl RunnerRegistry {
    pub fn get(&self, name: &str) -> Option<&RunnerProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn runner_kind_round_trips_through_str() {
        for kind in [
            RunnerKind::Codex,
            RunnerKind::Claude,
            RunnerKind::Gemini,
            RunnerKind::Opencode,
            RunnerKind::Script,
        ] {
            let s = kind.as_str();
            assert_eq!(RunnerKind::from_str(s).unwrap(), kind);
        }
    }

    #[test]
    fn runner_kind_rejects_unknown() {
        assert!(RunnerKind::from_str("nonsense").is_err());
    }

    #[test]
    fn registry_lookup() {
        let mut reg = RunnerRegistry::default();
        reg.profiles
            .insert("primary".into(), RunnerProfile::new("primary", RunnerKind::Codex));
        assert!(reg.contains("primary"));
        assert!(!reg.contains("backup"));
        assert_eq!(reg.get("primary").unwrap().kind, RunnerKind::Codex);
    }
}
