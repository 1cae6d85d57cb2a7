use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};

use super::resolve_path;

const DEFAULT_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "Read"
    }

    fn description(&self) -> &str {
        "Read file contents from the filesystem"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["file_path"],
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let file_path = require_str(&args, "file_path")?;
        let path = resolve_path(file_path, &ctx.working_directory);

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to read {}: {e}", path.display()))
        })?;

        let offset = args["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = args["limit"].as_u64().map_or(DEFAULT_LIMIT, |n| n as usize);

        let output: String = content
            .lines()
            .enumerate()
            .skip(offset - 1)
            .take(limit)
            .map(|(i, line)| {
                let line: String = line.chars().take(MAX_LINE_CHARS).collect();
                format!("{:>6}\t{}\n", i + 1, line)
            })
            .collect();

        if output.is_empty() {
            return Ok("(empty file)".into());
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ctx;
    use serde_json::json;

    #[tokio::test]
    async fn numbers_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "line 1\nline 2\nline 3\n").unwrap();

        let out = ReadTool
            .execute(json!({"file_path": "a.txt"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(out, "     1\tline 1\n     2\tline 2\n     3\tline 3\n");
    }

    #[tokio::test]
    async fn offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        std::fs::write(&path, "a\nb\nc\nd\n").unwrap();

        let out = ReadTool
            .execute(
                json!({"file_path": path.to_str().unwrap(), "offset": 2, "limit": 2}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(out, "     2\tb\n     3\tc\n");
    }

    #[tokio::test]
    async fn empty_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("e.txt"), "").unwrap();
        let out = ReadTool
            .execute(json!({"file_path": "e.txt"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(out, "(empty file)");
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadTool
            .execute(json!({"file_path": "nope.txt"}), &ctx(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn missing_argument() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadTool.execute(json!({}), &ctx(dir.path())).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
