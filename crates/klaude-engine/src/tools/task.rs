use async_trait::async_trait;
use klaude_core::tools::{require_str, SubagentRequest, Tool, ToolContext, ToolError};

pub const TASK_TOOL_NAME: &str = "Task";

/// Launches a nested sub-agent through the context's spawner and returns its final answer.
pub struct TaskTool;

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        TASK_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Launch an autonomous sub-agent to handle a complex, multi-step task"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["description", "prompt"],
            "properties": {
                "description": {
                    "type": "string",
                    "description": "A short (3-5 word) description of the task"
                },
                "prompt": {
                    "type": "string",
                    "description": "The task for the sub-agent to perform"
                },
                "subagent_type": {
                    "type": "string",
                    "description": "Kind of agent to use for this task"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let description = require_str(&args, "description")?.to_string();
        let prompt = require_str(&args, "prompt")?.to_string();
        let subagent_type = args["subagent_type"].as_str().map(str::to_string);

        let request = SubagentRequest {
            description,
            prompt,
            subagent_type,
            parent_task_id: ctx.parent_task_id.clone(),
            depth: ctx.depth + 1,
        };
        ctx.subagents.spawn(request).await
    }
}
