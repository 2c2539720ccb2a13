use std::path::Path;

use async_trait::async_trait;
use runforge_types::{RunnerProfile, Task, TaskResult};

use super::common::{execute, EventInterpretation};
use crate::{RunContext, RunnerAdapter};

pub struct GeminiAdapter;

#[async_trait]
impl RunnerAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn run(
        &self,
        ctx: &RunContext,
        task: &Task,
        profile: &RunnerProfile,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        let program = profile.command.clone().unwrap_or_else(|| "gemini".to_string());
        let mut args = vec![
            "--output-format".to_string(),
            "json".to_string(),
            "--yolo".to_string(),
        ];
        if let Some(model) = &profile.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push("--prompt".to_string());
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
            Some("result") => {
                if value.get("status").and_then(|s| s.as_str()) != Some("success") {
                    failed = true;
                }
            }
            Some("message") => {
                if value.get("role").and_then(|r| r.as_str()) == Some("assistant") {
                    if let Some(text) = value.get("content").and_then(|c| c.as_str()) {
                        last_msg = Some(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    EventInterpretation { failed, last_msg }
}
