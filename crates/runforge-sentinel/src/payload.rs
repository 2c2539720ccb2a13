//! Sentinel payload shape (see the external-interfaces section of the
//! specification this crate implements) plus derivation of a prompt and a
//! constraint profile from it.

use chrono::{DateTime, Utc};
use runforge_types::{RunforgeError, Task};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub deny_paths: Vec<String>,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub version: u32,
    pub wo_id: String,
    pub incident_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    pub target: Target,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub proposed_goals: Vec<String>,
}

const NETWORK_DENY_COMMANDS: &[&str] = &["curl", "wget", "nc", "ssh", "scp", "rsync"];
const SUDO_DENY_COMMANDS: &[&str] = &["sudo", "su", "doas"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstraintProfile {
    pub allow_paths: Vec<String>,
    pub deny_paths: Vec<String>,
    pub denied_commands: Vec<String>,
    pub max_steps: Option<u32>,
}

impl Payload {
    pub fn validate(&self) -> Result<(), RunforgeError> {
        if self.wo_id.trim().is_empty() {
            return Err(RunforgeError::InvalidConfig("wo_id is required".into()));
        }
        if self.incident_id.trim().is_empty() {
            return Err(RunforgeError::InvalidConfig("incident_id is required".into()));
        }
        if self.target.host.trim().is_empty() {
            return Err(RunforgeError::InvalidConfig("target.host is required".into()));
        }
        if self.target.scope.trim().is_empty() {
            return Err(RunforgeError::InvalidConfig("target.scope is required".into()));
        }
        if self.observations.is_empty() {
            return Err(RunforgeError::InvalidConfig(
                "at least one observation is required".into(),
            ));
        }
        if self.proposed_goals.is_empty() {
            return Err(RunforgeError::InvalidConfig(
                "at least one proposed goal is required".into(),
            ));
        }
        Ok(())
    }

    pub fn constraint_profile(&self) -> ConstraintProfile {
        let mut denied_commands = Vec::new();
        if !self.constraints.network {
            denied_commands.extend(NETWORK_DENY_COMMANDS.iter().map(|s| s.to_string()));
        }
        if !self.constraints.sudo {
            denied_commands.extend(SUDO_DENY_COMMANDS.iter().map(|s| s.to_string()));
        }
        ConstraintProfile {
            allow_paths: self.constraints.allow_paths.clone(),
            deny_paths: self.constraints.deny_paths.clone(),
            denied_commands,
            max_steps: self.constraints.max_steps,
        }
    }

    pub fn prompt(&self) -> String {
        let mut observations = self.observations.clone();
        observations.sort_by(|a, b| b.severity.cmp(&a.severity));

        let mut text = format!(
            "Investigate incident {} on {} (scope: {}).\n\nObservations (most severe first):\n",
            self.incident_id, self.target.host, self.target.scope
        );
        for obs in &observations {
            text.push_str(&format!("- [{:?}] {}: {}\n", obs.severity, obs.kind, obs.detail));
        }
        text.push_str("\nProposed goals:\n");
        for goal in &self.proposed_goals {
            text.push_str(&format!("- {goal}\n"));
        }

        let profile = self.constraint_profile();
        if !profile.denied_commands.is_empty() {
            text.push_str(&format!(
                "\nDo not use these commands: {}\n",
                profile.denied_commands.join(", ")
            ));
        }
        if !profile.deny_paths.is_empty() {
            text.push_str(&format!("Do not touch these paths: {}\n", profile.deny_paths.join(", ")));
        }
        text
    }

    pub fn to_task(&self, repo: &str) -> Task {
        let mut task = Task::new(self.wo_id.clone(), repo.to_string(), self.prompt());
        task.title = format!("incident {}", self.incident_id);
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> Payload {
        Payload {
            version: 1,
            wo_id: "wo-001".into(),
            incident_id: "inc-1".into(),
            created_at: Utc::now(),
            approved_at: None,
            target: Target {
                host: "host-1".into(),
                scope: "repo-root".into(),
            },
            observations: vec![
                Observation {
                    kind: "alert".into(),
                    severity: Severity::Medium,
                    detail: "elevated error rate".into(),
                },
                Observation {
                    kind: "alert".into(),
                    severity: Severity::Critical,
                    detail: "service down".into(),
                },
            ],
            constraints: Constraints {
                allow_paths: vec!["src/".into()],
                deny_paths: vec!["secrets/".into()],
                network: false,
                sudo: false,
                max_steps: Some(10),
            },
            proposed_goals: vec!["restore service".into()],
        }
    }

    #[test]
    fn validate_accepts_well_formed_payload() {
        assert!(valid_payload().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_observations() {
        let mut p = valid_payload();
        p.observations.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_goals() {
        let mut p = valid_payload();
        p.proposed_goals.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn prompt_orders_observations_by_severity_descending() {
        let p = valid_payload();
        let prompt = p.prompt();
        let critical_pos = prompt.find("service down").unwrap();
        let medium_pos = prompt.find("elevated error rate").unwrap();
        assert!(critical_pos < medium_pos);
    }

    #[test]
    fn constraint_profile_denies_network_and_sudo_commands_by_default() {
        let p = valid_payload();
        let profile = p.constraint_profile();
        assert!(profile.denied_commands.contains(&"curl".to_string()));
        assert!(profile.denied_commands.contains(&"sudo".to_string()));
    }

    #[test]
    fn constraint_profile_allows_network_when_enabled() {
        let mut p = valid_payload();
        p.constraints.network = true;
        let profile = p.constraint_profile();
        assert!(!profile.denied_commands.contains(&"curl".to_string()));
    }
}
