use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};

use super::resolve_path;

pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "Write"
    }

    fn description(&self) -> &str {
        "Write content to a file, replacing it if it exists"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["file_path", "content"],
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let file_path = require_str(&args, "file_path")?;
        let content = require_str(&args, "content")?;
        let path = resolve_path(file_path, &ctx.working_directory);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, content).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to write {}: {e}", path.display()))
        })?;

        Ok(format!(
            "Wrote {} bytes ({} lines) to {}",
            content.len(),
            content.lines().count(),
            path.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ctx;
    use serde_json::json;
    use std::fs;

    #[tokio::test]
    async fn writes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = WriteTool
            .execute(
                json!({"file_path": "output.txt", "content": "hello world\n"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.contains("12 bytes (1 lines)"));
        assert_eq!(fs::read_to_string(dir.path().join("output.txt")).unwrap(), "hello world\n");
    }

    #[tokio::test]
    async fn creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c/file.txt");
        WriteTool
            .execute(
                json!({"file_path": target.to_str().unwrap(), "content": "nested"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(target).unwrap(), "nested");
    }

    #[tokio::test]
    async fn overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("existing.txt"), "old content").unwrap();
        WriteTool
            .execute(
                json!({"file_path": "existing.txt", "content": "new content"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("existing.txt")).unwrap(),
            "new content"
        );
    }

    #[tokio::test]
    async fn content_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let err = WriteTool
            .execute(json!({"file_path": "x.txt"}), &ctx(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
