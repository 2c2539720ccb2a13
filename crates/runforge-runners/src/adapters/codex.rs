use std::path::Path;

use async_trait::async_trait;
use runforge_types::{RunnerProfile, Task, TaskResult};

use super::common::{execute, EventInterpretation};
use crate::{RunContext, RunnerAdapter};

pub struct CodexAdapter;

#[async_trait]
impl RunnerAdapter for CodexAdapter {
    fn name(&self) -> &str {
        "codex"
    }

    async fn run(
        &self,
        ctx: &RunContext,
        task: &Task,
        profile: &RunnerProfile,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        let program = profile.command.clone().unwrap_or_else(|| "codex".to_string());
        let mut args = vec![
            "exec".to_string(),
            "--json".to_string(),
            "--full-auto".to_string(),
            "--skip-git-repo-check".to_string(),
        ];
        if let Some(model) = &profile.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(native) = &profile.native_profile {
            args.push("--profile".to_string());
            args.push(native.clone());
        }
        args.push(task.prompt.clone());

        execute(ctx, task, profile, repo_dir, output_dir, program, args, true, interpret).await
    }
}

fn interpret(lines: &[String]) -> EventInterpretation {
    let mut failed = false;
    let mut last_msg = None;
    for line in lines {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        match value.get("type").and_then(|t| t.as_str()) {
            Some("turn.failed") => failed = true,
            Some("item.completed") => {
                let item = value.get("item");
                let kind = item.and_then(|i| i.get("type")).and_then(|t| t.as_str());
                if kind == Some("agent_message") {
                    if let Some(text) = item.and_then(|i| i.get("text")).and_then(|t| t.as_str()) {
                        last_msg = Some(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    EventInterpretation { failed, last_msg }
}
