use std::path::Path;

use async_trait::async_trait;
use runforge_types::{RunnerProfile, Task, TaskResult};

use super::common::{execute, EventInterpretation};
use crate::{RunContext, RunnerAdapter};

pub struct OpencodeAdapter;

#[async_trait]
impl RunnerAdapter for OpencodeAdapter {
    fn name(&self) -> &str {
        "opencode"
    }

    async fn run(
        &self,
        ctx: &RunContext,
        task: &Task,
        profile: &RunnerProfile,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        let program = profile
            .command
            .clone()
            .unwrap_or_else(|| "opencode".to_string());
        let mut args = vec!["run".to_string(), "--print-logs".to_string()];
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
        let type_ = value.get("type").and_then(|t| t.as_str());
        match type_ {
            Some("error") => failed = true,
            Some("step_finish") => {
                let reason = value
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .or_else(|| value.get("part").and_then(|p| p.get("reason")).and_then(|r| r.as_str()));
                if reason == Some("error") {
                    failed = true;
                }
            }
            _ => {}
        }

        if let Some(text) = value
            .get("part")
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
        {
            last_msg = Some(text.to_string());
        } else if let Some(text) = value.get("response").and_then(|r| r.as_str()) {
            last_msg = Some(text.to_string());
        }
    }
    EventInterpretation { failed, last_msg }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_error_event_marks_failure() {
        let lines = vec![r#"{"type":"error","message":"boom"}"#.to_string()];
        assert!(interpret(&lines).failed);
    }

    #[test]
    fn step_finish_with_error_reason_marks_failure() {
        let lines = vec![r#"{"type":"step_finish","reason":"error"}"#.to_string()];
        assert!(interpret(&lines).failed);
    }

    #[test]
    fn legacy_response_field_is_captured() {
        let lines = vec![r#"{"response":"legacy text"}"#.to_string()];
        assert_eq!(interpret(&lines).last_msg.as_deref(), Some("legacy text"));
    }

    #[test]
    fn part_text_is_captured() {
        let lines = vec![r#"{"type":"text","part":{"text":"hi there"}}"#.to_string()];
        assert_eq!(interpret(&lines).last_msg.as_deref(), Some("hi there"));
    }
}
