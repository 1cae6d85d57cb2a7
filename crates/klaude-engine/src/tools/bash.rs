use std::time::Duration;

use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TIMEOUT_MS: u64 = 600_000;

pub struct BashTool {
    timeout: Duration,
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "Bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (max 600000)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let command = require_str(&args, "command")?;

        let timeout = args["timeout"]
            .as_u64()
            .map(|ms| Duration::from_millis(ms.min(MAX_TIMEOUT_MS)))
            .unwrap_or(self.timeout);

        let run = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.working_directory)
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = tokio::time::timeout(timeout, run) => result
                .map_err(|_| ToolError::Timeout(timeout))?
                .map_err(|e| ToolError::ExecutionFailed(format!("failed to execute command: {e}")))?,
            () = ctx.abort_signal.cancelled() => return Err(ToolError::Cancelled),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut content = stdout.into_owned();
        if !stderr.is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&stderr);
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(ToolError::ExecutionFailed(format!(
                "exit code {code}\n{content}"
            )));
        }
        if content.is_empty() {
            content = "(no output)".into();
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ctx;
    use serde_json::json;

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = BashTool::new()
            .execute(json!({"command": "ls"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn stderr_is_included() {
        let dir = tempfile::tempdir().unwrap();
        let out = BashTool::new()
            .execute(json!({"command": "echo out; echo err 1>&2"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(out, "out\n\nerr\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BashTool::new()
            .execute(json!({"command": "echo boom; exit 3"}), &ctx(dir.path()))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 3"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn times_out() {
        let dir = tempfile::tempdir().unwrap();
        let err = BashTool::with_timeout(Duration::from_millis(50))
            .execute(json!({"command": "sleep 5"}), &ctx(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[tokio::test]
    async fn abort_signal_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.abort_signal.cancel();
        let err = BashTool::new()
            .execute(json!({"command": "sleep 5"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }

    #[tokio::test]
    async fn empty_output_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let out = BashTool::new()
            .execute(json!({"command": "true"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(out, "(no output)");
    }
}
