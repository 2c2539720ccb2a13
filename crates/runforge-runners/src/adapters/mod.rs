mod claude;
mod codex;
pub(crate) mod common;
mod gemini;
mod opencode;
mod script;

use std::sync::Arc;

use runforge_types::RunnerKind;

use crate::RunnerAdapter;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use gemini::GeminiAdapter;
pub use opencode::OpencodeAdapter;
pub use script::ScriptAdapter;

/// Construct the adapter instance for a runner backend kind. Adapters are
/// stateless, so this can be called freely without caching.
pub fn build_adapter(kind: RunnerKind) -> Arc<dyn RunnerAdapter> {
    match kind {
        RunnerKind::Codex => Arc::new(CodexAdapter),
        RunnerKind::Claude => Arc::new(ClaudeAdapter),
        RunnerKind::Gemini => Arc::new(GeminiAdapter),
        RunnerKind::Opencode => Arc::new(OpencodeAdapter),
        RunnerKind::Script => Arc::new(ScriptAdapter),
    }
}
