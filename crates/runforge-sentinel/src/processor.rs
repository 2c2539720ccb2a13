//! Validate -> move -> derive -> invoke-cascade -> write-result pipeline
//! for a single payload file dropped into the sentinel's inbox directory.

use std::path::{Path, PathBuf};

use chrono::Utc;
use runforge_cascade::Cascade;
use runforge_types::{RunforgeError, TaskResult, TaskState};
use tokio_util::sync::CancellationToken;

use crate::payload::Payload;

#[derive(Debug, Clone)]
pub struct SentinelPaths {
    pub inbox: PathBuf,
    pub processing: PathBuf,
    pub completed: PathBuf,
    pub failed: PathBuf,
    pub repos_root: PathBuf,
    pub output_root: PathBuf,
}

impl SentinelPaths {
    pub fn new(root: impl Into<PathBuf>, repos_root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        SentinelPaths {
            inbox: root.join("inbox"),
            processing: root.join("processing"),
            completed: root.join("completed"),
            failed: root.join("failed"),
            repos_root: repos_root.into(),
            output_root: root.join("output"),
        }
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.inbox, &self.processing, &self.completed, &self.failed, &self.output_root] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct ProcessingOutcome {
    wo_id: String,
    incident_id: String,
    result: TaskResult,
}

/// Runs a single payload file (already moved into `processing/`) through
/// validation and the cascade, writing its outcome into `completed/` or
/// `failed/` and removing the processing copy on the way out.
pub async fn process_file(
    cascade: &Cascade,
    paths: &SentinelPaths,
    file_name: &str,
    cancel: &CancellationToken,
) -> Result<(), RunforgeError> {
    let processing_path = paths.processing.join(file_name);
    let raw = tokio::fs::read_to_string(&processing_path).await?;

    let payload: Payload = match serde_json::from_str(&raw) {
        Ok(p) => p,
        Err(e) => {
            write_failure(paths, file_name, &format!("malformed payload: {e}")).await?;
            tokio::fs::remove_file(&processing_path).await?;
            return Ok(());
        }
    };

    if let Err(e) = payload.validate() {
        write_failure(paths, file_name, &e.to_string()).await?;
        tokio::fs::remove_file(&processing_path).await?;
        return Ok(());
    }

    let repo_dir = paths.repos_root.join(&payload.target.scope);
    let output_dir = paths.output_root.join(&payload.wo_id);
    let task = payload.to_task(&payload.target.scope);

    let result = cascade.run(cancel, &task, &repo_dir, &output_dir).await;
    let succeeded = result.state.is_successful();

    let outcome = ProcessingOutcome {
        wo_id: payload.wo_id.clone(),
        incident_id: payload.incident_id.clone(),
        result,
    };
    let dest_dir = if succeeded { &paths.completed } else { &paths.failed };
    write_outcome(dest_dir, file_name, &outcome).await?;
    tokio::fs::remove_file(&processing_path).await?;
    Ok(())
}

async fn write_failure(paths: &SentinelPaths, file_name: &str, reason: &str) -> Result<(), RunforgeError> {
    let body = serde_json::json!({ "error": reason });
    let dest = paths.failed.join(file_name);
    tokio::fs::write(&dest, serde_json::to_vec_pretty(&body)?).await?;
    Ok(())
}

async fn write_outcome(dir: &Path, file_name: &str, outcome: &ProcessingOutcome) -> Result<(), RunforgeError> {
    let dest = dir.join(file_name);
    tokio::fs::write(&dest, serde_json::to_vec_pretty(outcome)?).await?;
    Ok(())
}

/// A file left behind in `processing/` means a prior sentinel run was
/// killed mid-processing; the incident it represents is in an unknown
/// state, so it is never silently re-run. Instead each orphan is turned
/// into a synthetic `Failed` outcome in `failed/` and the processing copy
/// is removed, matching how `process_file` reports any other failure.
pub async fn recover_orphans(paths: &SentinelPaths) -> Result<usize, RunforgeError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(&paths.processing).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name());
        }
    }

    let mut recovered = 0;
    for name in names {
        let file_name = name.to_string_lossy().to_string();
        let path = paths.processing.join(&name);
        let raw = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        let (wo_id, incident_id) = match serde_json::from_str::<Payload>(&raw) {
            Ok(p) => (p.wo_id, p.incident_id),
            Err(_) => (file_name.clone(), file_name.clone()),
        };

        let now = Utc::now();
        let mut result = TaskResult::new(wo_id.clone(), now);
        result.ended_at = now;
        result.state = TaskState::Failed;
        result.error = Some(
            "orphaned payload recovered at sentinel startup: prior run was interrupted mid-processing"
                .to_string(),
        );

        let outcome = ProcessingOutcome {
            wo_id,
            incident_id,
            result,
        };
        write_outcome(&paths.failed, &file_name, &outcome).await?;
        tokio::fs::remove_file(&path).await?;
        recovered += 1;
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_json() -> &'static str {
        r#"{
            "version": 1,
            "wo_id": "wo-1",
            "incident_id": "inc-1",
            "created_at": "2026-01-01T00:00:00Z",
            "target": {"host": "h", "scope": "repo"},
            "observations": [{"type": "alert", "severity": "high", "detail": "d"}],
            "proposed_goals": ["fix it"]
        }"#
    }

    #[tokio::test]
    async fn malformed_payload_is_written_to_failed_and_processing_is_cleared() {
        let dir = tempdir().unwrap();
        let paths = SentinelPaths::new(dir.path().join("sentinel"), dir.path().join("repos"));
        paths.ensure_dirs().await.unwrap();
        tokio::fs::write(paths.processing.join("bad.json"), "not json").await.unwrap();

        let registry = runforge_types::RunnerRegistry::default();
        let cascade = Cascade::new(
            registry,
            std::sync::Arc::new(runforge_state::Blacklist::load(dir.path().join("bl.json"))),
            std::sync::Arc::new(runforge_state::Graylist::load(dir.path().join("gl.json"))),
            std::sync::Arc::new(runforge_state::ProviderLimiter::new(Default::default())),
            runforge_cascade::CascadeConfig::default(),
        );
        let cancel = CancellationToken::new();
        process_file(&cascade, &paths, "bad.json", &cancel).await.unwrap();

        assert!(paths.failed.join("bad.json").exists());
        assert!(!paths.processing.join("bad.json").exists());
    }

    #[tokio::test]
    async fn invalid_payload_fields_land_in_failed() {
        let dir = tempdir().unwrap();
        let paths = SentinelPaths::new(dir.path().join("sentinel"), dir.path().join("repos"));
        paths.ensure_dirs().await.unwrap();
        let invalid = r#"{"version":1,"wo_id":"","incident_id":"i","created_at":"2026-01-01T00:00:00Z","target":{"host":"h","scope":"s"},"observations":[],"proposed_goals":[]}"#;
        tokio::fs::write(paths.processing.join("p.json"), invalid).await.unwrap();

        let registry = runforge_types::RunnerRegistry::default();
        let cascade = Cascade::new(
            registry,
            std::sync::Arc::new(runforge_state::Blacklist::load(dir.path().join("bl.json"))),
            std::sync::Arc::new(runforge_state::Graylist::load(dir.path().join("gl.json"))),
            std::sync::Arc::new(runforge_state::ProviderLimiter::new(Default::default())),
            runforge_cascade::CascadeConfig::default(),
        );
        let cancel = CancellationToken::new();
        process_file(&cascade, &paths, "p.json", &cancel).await.unwrap();
        assert!(paths.failed.join("p.json").exists());
    }

    #[tokio::test]
    async fn recover_orphans_writes_synthetic_failure_and_clears_processing() {
        let dir = tempdir().unwrap();
        let paths = SentinelPaths::new(dir.path().join("sentinel"), dir.path().join("repos"));
        paths.ensure_dirs().await.unwrap();
        tokio::fs::write(paths.processing.join("orphan.json"), sample_json()).await.unwrap();

        let recovered = recover_orphans(&paths).await.unwrap();
        assert_eq!(recovered, 1);
        assert!(!paths.inbox.join("orphan.json").exists());
        assert!(!paths.processing.join("orphan.json").exists());

        let written = tokio::fs::read_to_string(paths.failed.join("orphan.json")).await.unwrap();
        let outcome: ProcessingOutcome = serde_json::from_str(&written).unwrap();
        assert_eq!(outcome.wo_id, "wo-1");
        assert_eq!(outcome.result.state, runforge_types::TaskState::Failed);
    }
}
