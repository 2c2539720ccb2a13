use std::path::Path;

use async_trait::async_trait;
use runforge_types::{RunnerProfile, Task, TaskResult};

use super::common::{execute, EventInterpretation};
use crate::{RunContext, RunnerAdapter};

/// No event protocol; the outcome is driven solely by the subprocess exit
/// code. `profile.command` is the script/executable to invoke; the task
/// prompt and repo path are passed as positional arguments.
pub struct ScriptAdapter;

#[async_trait]
impl RunnerAdapter for ScriptAdapter {
    fn name(&self) -> &str {
        "script"
    }

    async fn run(
        &self,
        ctx: &RunContext,
        task: &Task,
        profile: &RunnerProfile,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        let Some(program) = profile.command.clone() else {
            let mut r = TaskResult::new(task.id.clone(), chrono::Utc::now());
            r.ended_at = r.started_at;
            r.state = runforge_types::TaskState::Failed;
            r.error = Some("script runner profile has no command configured".to_string());
            return r;
        };
        let args = vec![task.prompt.clone(), repo_dir.display().to_string()];

        execute(
            ctx,
            task,
            profile,
            repo_dir,
            output_dir,
            program,
            args,
            false,
            |_lines| EventInterpretation {
                failed: false,
                last_msg: None,
            },
        )
        .await
    }
}
