use thiserror::Error;

/// Crate-wide error taxonomy, shared by every `runforge-*` crate that needs
/// to report a typed failure rather than an opaque `anyhow::Error`.
#[derive(Error, Debug)]
pub enum RunforgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid task file: {0}")]
    InvalidConfig(String),

    #[error("cycle detected in task graph: {0:?}")]
    Cycle(Vec<String>),

    #[error("dangling dependency: task {task_id} depends on unknown task {dependency_id}")]
    DanglingDependency {
        task_id: String,
        dependency_id: String,
    },

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("empty task list")]
    EmptyTaskList,

    #[error("repo unavailable: {0}")]
    RepoUnavailable(String),

    #[error("spawn failure: {0}")]
    SpawnFailure(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("idle timeout: no output for {0:?}")]
    IdleTimeout(std::time::Duration),

    #[error("event stream failure: {0}")]
    EventStream(String),

    #[error("false positive: runner exited cleanly with no events")]
    FalsePositive,

    #[error("cascade exhausted for task {0}")]
    CascadeExhausted(String),

    #[error("cancelled")]
    Cancelled,

    #[error("runner not found: {0}")]
    UnknownRunner(String),

    #[error("lock busy: {0}")]
    LockBusy(String),

    #[error("{0}")]
    Other(String),
}

impl From<String> for RunforgeError {
    fn from(value: String) -> Self {
        RunforgeError::Other(value)
    }
}

pub type Result<T> = std::result::Result<T, RunforgeError>;
