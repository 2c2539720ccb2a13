//! Parses the JSON task-file format into a `Task` list plus the resolved
//! `RunnerRegistry`, enforcing the structural invariants a task file must
//! satisfy before the graph is built.

use std::collections::HashSet;
use std::path::Path;

use runforge_types::{DependsOnSpec, RunforgeError, RunnerProfile, RunnerRegistry, Task};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawTask {
    id: String,
    repo: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    title: Option<String>,
    prompt: String,
    #[serde(default)]
    depends_on: DependsOnSpec,
    #[serde(default)]
    runner: Option<String>,
    #[serde(default)]
    fallbacks: Vec<String>,
}

/// Raw shape of the top-level task file. `review` is forwarded opaquely
/// to whatever external reviewer collaborator consumes it; the core
/// parser neither validates nor acts on its contents.
#[derive(Debug, Deserialize)]
pub struct RawTaskFile {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub allowed_repos: Option<Vec<String>>,
    #[serde(default)]
    pub default_runner: Option<String>,
    #[serde(default)]
    pub default_fallbacks: Vec<String>,
    #[serde(default)]
    pub runners: std::collections::HashMap<String, RunnerProfile>,
    #[serde(default)]
    pub review: Option<serde_json::Value>,
    tasks: Vec<RawTask>,
}

pub struct ParsedTaskFile {
    pub description: Option<String>,
    pub review: Option<serde_json::Value>,
    pub tasks: Vec<Task>,
    pub registry: RunnerRegistry,
}

const BUILTIN_RUNNER_KINDS: &[&str] = &["codex", "claude", "gemini", "opencode", "script"];

pub fn parse_str(contents: &str) -> Result<ParsedTaskFile, RunforgeError> {
    let raw: RawTaskFile = serde_json::from_str(contents)?;
    build(raw)
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<ParsedTaskFile, RunforgeError> {
    let contents = std::fs::read_to_string(path)?;
    parse_str(&contents)
}

fn build(raw: RawTaskFile) -> Result<ParsedTaskFile, RunforgeError> {
    if raw.tasks.is_empty() {
        return Err(RunforgeError::EmptyTaskList);
    }

    let registry = RunnerRegistry {
        default_runner: raw.default_runner.clone(),
        default_fallbacks: raw.default_fallbacks.clone(),
        profiles: raw.runners.clone(),
    };

    let mut seen_ids = HashSet::new();
    let mut tasks = Vec::with_capacity(raw.tasks.len());

    for rt in &raw.tasks {
        if rt.id.trim().is_empty() {
            return Err(RunforgeError::InvalidConfig("task id must not be empty".into()));
        }
        if rt.repo.trim().is_empty() {
            return Err(RunforgeError::InvalidConfig(format!("task {} has an empty repo", rt.id)));
        }
        if rt.prompt.trim().is_empty() {
            return Err(RunforgeError::InvalidConfig(format!("task {} has an empty prompt", rt.id)));
        }
        if !seen_ids.insert(rt.id.clone()) {
            return Err(RunforgeError::DuplicateTaskId(rt.id.clone()));
        }
    }

    if let Some(allowed) = &raw.allowed_repos {
        let allowed_set: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        for rt in &raw.tasks {
            if !allowed_set.contains(rt.repo.as_str()) {
                return Err(RunforgeError::InvalidConfig(format!(
                    "task {} targets repo {} which is not in allowed_repos",
                    rt.id, rt.repo
                )));
            }
        }
    }

    for rt in &raw.tasks {
        for runner_name in std::iter::once(&rt.runner)
            .filter_map(|o| o.as_ref())
            .chain(rt.fallbacks.iter())
        {
            resolve_runner_name(runner_name, &registry)?;
        }
    }
    for name in std::iter::once(&registry.default_runner)
        .filter_map(|o| o.as_ref())
        .chain(registry.default_fallbacks.iter())
    {
        resolve_runner_name(name, &registry)?;
    }

    for rt in &raw.tasks {
        let depends_on: Vec<String> = rt.depends_on.clone().into();
        for dep in &depends_on {
            if !seen_ids.contains(dep) {
                return Err(RunforgeError::DanglingDependency {
                    task_id: rt.id.clone(),
                    dependency_id: dep.clone(),
                });
            }
        }
        tasks.push(Task {
            id: rt.id.clone(),
            repo: rt.repo.clone(),
            priority: rt.priority,
            title: rt.title.clone().unwrap_or_else(|| rt.id.clone()),
            prompt: rt.prompt.clone(),
            depends_on,
            runner: rt.runner.clone(),
            fallbacks: rt.fallbacks.clone(),
        });
    }

    Ok(ParsedTaskFile {
        description: raw.description.clone(),
        review: raw.review.clone(),
        tasks,
        registry,
    })
}

fn resolve_runner_name(name: &str, registry: &RunnerRegistry) -> Result<(), RunforgeError> {
    if registry.contains(name) || BUILTIN_RUNNER_KINDS.contains(&name) {
        Ok(())
    } else {
        Err(RunforgeError::UnknownRunner(name.to_string()))
    }
}
