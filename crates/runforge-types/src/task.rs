use serde::{Deserialize, Serialize};

/// Lifecycle of a single task as tracked by the scheduler.
///
/// `Pending -> Ready -> Running -> {Completed | Failed | RateLimited}`, or
/// `Pending -> Skipped` once any dependency lands on a non-`Completed`
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
    RateLimited,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Skipped | TaskState::RateLimited
        )
    }

    pub fn is_successful(self) -> bool {
        matches!(self, TaskState::Completed)
    }
}

/// A unit of work: a prompt to run against a repo, with an optional runner
/// choice and an ordered fallback list, plus the dependencies that must
/// complete before it becomes eligible to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub repo: String,
    #[serde(default)]
    pub priority: i64,
    pub title: String,
    pub prompt: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub runner: Option<String>,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, repo: impl Into<String>, prompt: impl Into<String>) -> Self {
        let id = id.into();
        Task {
            title: id.clone(),
            id,
            repo: repo.into(),
            priority: 0,
            prompt: prompt.into(),
            depends_on: Vec::new(),
            runner: None,
            fallbacks: Vec::new(),
        }
    }
}

/// Raw `depends_on` shape accepted from the task file: either a single
/// string or an array of strings. Both normalize to a `Vec<String>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependsOnSpec {
    One(String),
    Many(Vec<String>),
}

impl Default for DependsOnSpec {
    fn default() -> Self {
        DependsOnSpec::Many(Vec::new())
    }
}

impl From<DependsOnSpec> for Vec<String> {
    fn from(spec: DependsOnSpec) -> Self {
        match spec {
            DependsOnSpec::One(s) => vec![s],
            DependsOnSpec::Many(v) => v,
        }
    }
}
