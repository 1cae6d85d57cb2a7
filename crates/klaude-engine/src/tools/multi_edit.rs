use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};
use serde::Deserialize;

use super::edit::apply_edit;
use super::resolve_path;

pub struct MultiEditTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EditOp {
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "MultiEdit"
    }

    fn description(&self) -> &str {
        "Apply several exact string replacements to one file, all or nothing"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["file_path", "edits"],
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to modify"
                },
                "edits": {
                    "type": "array",
                    "minItems": 1,
                    "description": "Edits applied in order, each to the result of the previous one. An empty old_string in the first edit creates the file.",
                    "items": {
                        "type": "object",
                        "required": ["old_string", "new_string"],
                        "additionalProperties": false,
                        "properties": {
                            "old_string": {"type": "string"},
                            "new_string": {"type": "string"},
                            "replace_all": {"type": "boolean"}
                        }
                    }
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let file_path = require_str(&args, "file_path")?;
        let edits: Vec<EditOp> = serde_json::from_value(args["edits"].clone())
            .map_err(|e| ToolError::InvalidArguments(format!("edits: {e}")))?;
        if edits.is_empty() {
            return Err(ToolError::InvalidArguments("no edits provided".into()));
        }

        let path = resolve_path(file_path, &ctx.working_directory);
        let creates_file = edits[0].old_string.is_empty();
        let original = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && creates_file => String::new(),
            Err(e) => {
                return Err(ToolError::ExecutionFailed(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let mut content = original;
        let mut summary = Vec::with_capacity(edits.len());
        for (i, edit) in edits.iter().enumerate() {
            if i == 0 && creates_file {
                content = edit.new_string.clone();
                summary.push("1. created file".to_string());
                continue;
            }
            let (updated, count) =
                apply_edit(&content, &edit.old_string, &edit.new_string, edit.replace_all)
                    .map_err(|e| in_edit(i, e))?;
            content = updated;
            summary.push(format!("{}. replaced {count} occurrence(s)", i + 1));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("failed to create directory: {e}")))?;
        }
        tokio::fs::write(&path, &content).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to write {}: {e}", path.display()))
        })?;

        Ok(format!(
            "Applied {} edit(s) to {}:\n{}",
            edits.len(),
            path.display(),
            summary.join("\n")
        ))
    }
}

fn in_edit(index: usize, err: ToolError) -> ToolError {
    match err {
        ToolError::InvalidArguments(msg) => {
            ToolError::InvalidArguments(format!("edit {}: {msg}", index + 1))
        }
        ToolError::ExecutionFailed(msg) => {
            ToolError::ExecutionFailed(format!("edit {}: {msg}", index + 1))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ctx;
    use serde_json::json;
    use std::fs;

    #[tokio::test]
    async fn edits_apply_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "let x = 1;\nlet y = x;\n").unwrap();

        let out = MultiEditTool
            .execute(
                json!({
                    "file_path": "a.rs",
                    "edits": [
                        {"old_string": "x", "new_string": "count", "replace_all": true},
                        {"old_string": "let count = 1;", "new_string": "let count = 2;"}
                    ]
                }),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.contains("1. replaced 2 occurrence(s)"));
        assert_eq!(
            fs::read_to_string(dir.path().join("a.rs")).unwrap(),
            "let count = 2;\nlet y = count;\n"
        );
    }

    #[tokio::test]
    async fn failing_edit_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha beta").unwrap();

        let err = MultiEditTool
            .execute(
                json!({
                    "file_path": "a.txt",
                    "edits": [
                        {"old_string": "alpha", "new_string": "gamma"},
                        {"old_string": "missing", "new_string": "x"}
                    ]
                }),
                &ctx(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("edit 2"));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "alpha beta");
    }

    #[tokio::test]
    async fn empty_first_old_string_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        MultiEditTool
            .execute(
                json!({
                    "file_path": "new/file.txt",
                    "edits": [
                        {"old_string": "", "new_string": "hello world"},
                        {"old_string": "world", "new_string": "there"}
                    ]
                }),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("new/file.txt")).unwrap(),
            "hello there"
        );
    }

    #[tokio::test]
    async fn missing_file_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultiEditTool
            .execute(
                json!({"file_path": "nope.txt", "edits": [{"old_string": "a", "new_string": "b"}]}),
                &ctx(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn empty_or_malformed_edits_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        for edits in [json!([]), json!([{"old_string": "a"}]), json!("nope")] {
            let err = MultiEditTool
                .execute(json!({"file_path": "x.txt", "edits": edits}), &ctx(dir.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }
}
