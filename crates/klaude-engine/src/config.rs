use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Klaude, an AI coding assistant.

You are an interactive CLI tool that helps users with software engineering tasks. Use the available tools to assist the user.

Key principles:
- Be concise and direct in your responses
- Use tools proactively when appropriate
- Follow existing code conventions in the project
- Always read files before editing them

Tool usage:
- You can call multiple tools in a single response; they run concurrently
- Use the Task tool for complex multi-step operations";

/// Orchestrator policy. Limits here belong to the orchestrator, not the session log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model round-trips allowed per prompt (top level and each sub-agent).
    pub max_turns: u32,
    pub tool_timeout_secs: u64,
    /// Deepest sub-agent nesting the Task tool may reach.
    pub max_subagent_depth: u32,
    pub max_tool_output_bytes: usize,
    pub system_prompt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 25,
            tool_timeout_secs: 120,
            max_subagent_depth: 3,
            max_tool_output_bytes: 30_000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}
