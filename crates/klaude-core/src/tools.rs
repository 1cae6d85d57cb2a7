use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::ids::{TaskId, ToolCallId};

/// Context available to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub tool_call_id: ToolCallId,
    pub working_directory: PathBuf,
    /// Task enclosing this call, if it runs inside a sub-agent.
    pub parent_task_id: Option<TaskId>,
    /// Sub-agent nesting depth of the calling conversation (0 at top level).
    pub depth: u32,
    pub subagents: Arc<dyn SubagentSpawner>,
    pub abort_signal: CancellationToken,
}

/// Tool definition sent to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Trait implemented by each tool. Given an args object, returns a string or fails.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
        }
    }
}

/// Request to run a nested sub-agent conversation.
#[derive(Clone, Debug)]
pub struct SubagentRequest {
    pub description: String,
    pub prompt: String,
    pub subagent_type: Option<String>,
    pub parent_task_id: Option<TaskId>,
    pub depth: u32,
}

/// Runs sub-agent tasks on behalf of the `Task` tool. The orchestrator provides this.
#[async_trait]
pub trait SubagentSpawner: Send + Sync {
    async fn spawn(&self, request: SubagentRequest) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Extract a required string argument.
pub fn require_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is required")))
}
