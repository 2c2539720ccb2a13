use std::path::Path;

use async_trait::async_trait;
use runforge_types::{RunnerProfile, Task, TaskResult};

use super::common::{execute, EventInterpretation};
use crate::{RunContext, RunnerAdapter};

pub struct ClaudeAdapter;

#[async_trait]
impl RunnerAdapter for ClaudeAdapter {
    fn name(&self) -> &str {
        "claude"
    }

    async fn run(
        &self,
        ctx: &RunContext,
        task: &Task,
        profile: &RunnerProfile,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        let program = profile.command.clone().unwrap_or_else(|| "claude".to_string());
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        if let Some(model) = &profile.model {
            args.push("--model".to_string());
            args.push(model.clone());
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
            Some("result") => {
                if value.get("status").and_then(|s| s.as_str()) == Some("error") {
                    failed = true;
                }
            }
            Some("message") => {
                if value.get("role").and_then(|r| r.as_str()) == Some("assistant") {
                    if let Some(content) = value.get("content").and_then(|c| c.as_array()) {
                        let text: String = content
                            .iter()
                            .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
                            .collect::<Vec<_>>()
                            .join("");
                        if !text.is_empty() {
                            last_msg = Some(text);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    EventInterpretation { failed, last_msg }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_error_status_marks_failure() {
        let lines = vec![r#"{"type":"result","status":"error"}"#.to_string()];
        assert!(interpret(&lines).failed);
    }

    #[test]
    fn assistant_message_text_is_concatenated() {
        let lines = vec![
            r#"{"type":"message","role":"assistant","content":[{"type":"text","text":"hello "},{"type":"text","text":"world"}]}"#.to_string(),
        ];
        let interp = interpret(&lines);
        assert_eq!(interp.last_msg.as_deref(), Some("hello world"));
        assert!(!interp.failed);
    }
}
