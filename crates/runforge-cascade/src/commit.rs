//! Conventional-commit auto-commit of whatever an agent left uncommitted
//! in the repo after a successful task.

use std::path::Path;

use runforge_types::Task;

pub async fn has_uncommitted_changes(repo_dir: &Path) -> bool {
    let output = tokio::process::Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(repo_dir)
        .output()
        .await;
    match output {
        Ok(out) => !out.stdout.is_empty(),
        Err(_) => false,
    }
}

/// Map a task title's leading verb to a conventional-commit type prefix.
pub fn commit_type(title: &str) -> &'static str {
    let lowered = title.to_lowercase();
    if ["fix", "resolve", "repair"].iter().any(|w| lowered.starts_with(w)) {
        "fix"
    } else if ["add", "create", "implement"].iter().any(|w| lowered.starts_with(w)) {
        "feat"
    } else if ["doc", "readme"].iter().any(|w| lowered.starts_with(w)) {
        "docs"
    } else if ["refactor", "clean", "simplify"].iter().any(|w| lowered.starts_with(w)) {
        "refactor"
    } else if lowered.starts_with("test") {
        "test"
    } else {
        "chore"
    }
}

pub fn commit_message(task: &Task) -> String {
    format!("{}: {}", commit_type(&task.title), task.title)
}

/// Stage and commit everything, returning the new commit hash on success.
pub async fn auto_commit(repo_dir: &Path, task: &Task) -> Option<String> {
    let add = tokio::process::Command::new("git")
        .args(["add", "-A"])
        .current_dir(repo_dir)
        .status()
        .await
        .ok()?;
    if !add.success() {
        return None;
    }

    let message = commit_message(task);
    let commit = tokio::process::Command::new("git")
        .args(["commit", "-m", &message])
        .current_dir(repo_dir)
        .status()
        .await
        .ok()?;
    if !commit.success() {
        return None;
    }

    let rev = tokio::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .await
        .ok()?;
    if !rev.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&rev.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runforge_types::Task;

    #[test]
    fn commit_type_maps_common_verbs() {
        assert_eq!(commit_type("Fix the parser"), "fix");
        assert_eq!(commit_type("Add a new endpoint"), "feat");
        assert_eq!(commit_type("Document the API"), "docs");
        assert_eq!(commit_type("Refactor the scheduler"), "refactor");
        assert_eq!(commit_type("Test the cascade"), "test");
        assert_eq!(commit_type("Bump dependency"), "chore");
    }

    #[test]
    fn commit_message_uses_full_title() {
        let task = Task::new("t1", "org/repo", "prompt");
        let mut task = task;
        task.title = "Fix flaky test".to_string();
        assert_eq!(commit_message(&task), "fix: Fix flaky test");
    }
}
