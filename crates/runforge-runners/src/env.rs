//! Environment sanitization for spawned subprocesses: strip anything that
//! looks like a credential from the inherited environment, then layer in
//! the profile's own overrides, resolving `env:NAME` indirections against
//! the caller's environment.

use std::collections::HashMap;
use std::env::VarError;

use runforge_types::RunforgeError;

const SENSITIVE_PREFIXES: &[&str] = &[
    "NULLBOT_",
    "GROQ_API",
    "OPENAI_API",
    "ANTHROPIC_API",
    "CHAINWATCH_",
    "RUNFORGE_",
    "AWS_SECRET",
    "AWS_SESSION",
    "GITHUB_TOKEN",
];

const SENSITIVE_EXACT: &[&str] = &["API_KEY", "API_SECRET", "SECRET_KEY"];

fn is_sensitive(name: &str) -> bool {
    SENSITIVE_EXACT.contains(&name) || SENSITIVE_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Build the full environment for a subprocess: the caller's environment
/// minus sensitive variables, plus the profile's own entries (literal
/// values pass through; `env:NAME` values are resolved from the caller's
/// environment and error if absent).
pub fn build_env(profile_env: &HashMap<String, String>) -> Result<HashMap<String, String>, RunforgeError> {
    let mut env: HashMap<String, String> = std::env::vars()
        .filter(|(name, _)| !is_sensitive(name))
        .collect();

    for (key, value) in profile_env {
        if let Some(var_name) = value.strip_prefix("env:") {
            match std::env::var(var_name) {
                Ok(resolved) => {
                    env.insert(key.clone(), resolved);
                }
                Err(VarError::NotPresent) => {
                    return Err(RunforgeError::InvalidConfig(format!(
                        "runner env override {key} references missing variable {var_name}"
                    )));
                }
                Err(VarError::NotUnicode(_)) => {
                    return Err(RunforgeError::InvalidConfig(format!(
                        "runner env override {key} references non-unicode variable {var_name}"
                    )));
                }
            }
        } else {
            env.insert(key.clone(), value.clone());
        }
    }

    Ok(env)
}
