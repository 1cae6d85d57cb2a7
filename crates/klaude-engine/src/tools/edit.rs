use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};

use super::resolve_path;

const SNIPPET_CONTEXT: usize = 3;

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "Edit"
    }

    fn description(&self) -> &str {
        "Perform exact string replacement in a file"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["file_path", "old_string", "new_string"],
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement string (must differ from old_string)"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let file_path = require_str(&args, "file_path")?;
        let old_string = require_str(&args, "old_string")?;
        let new_string = require_str(&args, "new_string")?;
        let replace_all = args["replace_all"].as_bool().unwrap_or(false);

        let path = resolve_path(file_path, &ctx.working_directory);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to read {}: {e}", path.display()))
        })?;

        let (updated, _) = apply_edit(&content, old_string, new_string, replace_all)?;

        tokio::fs::write(&path, &updated).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to write {}: {e}", path.display()))
        })?;

        Ok(match snippet(&updated, new_string) {
            Some(snippet) => format!(
                "The file {} has been updated. Snippet of the edited file:\n{snippet}",
                path.display()
            ),
            None => format!("The file {} has been updated.", path.display()),
        })
    }
}

/// Replace `old` with `new` in `content`. Returns the new text and the number
/// of replacements made.
///
/// Without `replace_all`, `old` must occur exactly once.
pub(crate) fn apply_edit(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<(String, usize), ToolError> {
    if old == new {
        return Err(ToolError::InvalidArguments(
            "old_string and new_string must be different".into(),
        ));
    }
    if old.is_empty() {
        return Err(ToolError::InvalidArguments("old_string must not be empty".into()));
    }

    let count = content.matches(old).count();
    if count == 0 {
        return Err(ToolError::ExecutionFailed("old_string not found in file".into()));
    }
    if replace_all {
        return Ok((content.replace(old, new), count));
    }
    if count > 1 {
        return Err(ToolError::ExecutionFailed(format!(
            "old_string is not unique in the file ({count} occurrences). Use replace_all or provide more context."
        )));
    }
    Ok((content.replacen(old, new, 1), 1))
}

/// Numbered lines around the first line containing `needle`.
fn snippet(content: &str, needle: &str) -> Option<String> {
    let first_line = needle.lines().next().filter(|l| !l.is_empty())?;
    let lines: Vec<&str> = content.lines().collect();
    let hit = lines.iter().position(|line| line.contains(first_line))?;
    let start = hit.saturating_sub(SNIPPET_CONTEXT);
    let end = (hit + SNIPPET_CONTEXT + 1).min(lines.len());
    Some(
        (start..end)
            .map(|i| format!("{:>6}\t{}", i + 1, lines[i]))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::ctx;
    use serde_json::json;
    use std::fs;

    #[tokio::test]
    async fn ambiguous_string_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.rs"), "fn hello() {\n    println!(\"hello\");\n}\n").unwrap();

        let err = EditTool
            .execute(
                json!({"file_path": "test.rs", "old_string": "hello", "new_string": "world"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not unique"));
        assert!(fs::read_to_string(dir.path().join("test.rs")).unwrap().contains("fn hello()"));
    }

    #[tokio::test]
    async fn unique_string_is_replaced_with_snippet() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.rs"), "fn main() {\n    println!(\"hello\");\n}\n").unwrap();

        let out = EditTool
            .execute(
                json!({"file_path": "test.rs", "old_string": "fn main()", "new_string": "fn start()"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(out.contains("     1\tfn start() {"));
        let content = fs::read_to_string(dir.path().join("test.rs")).unwrap();
        assert!(content.starts_with("fn start()"));
    }

    #[tokio::test]
    async fn replace_all() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.txt"), "foo bar foo baz foo").unwrap();

        EditTool
            .execute(
                json!({"file_path": "test.txt", "old_string": "foo", "new_string": "qux", "replace_all": true}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("test.txt")).unwrap(),
            "qux bar qux baz qux"
        );
    }

    #[tokio::test]
    async fn missing_string_and_missing_file_fail() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.txt"), "hello world").unwrap();

        let err = EditTool
            .execute(
                json!({"file_path": "test.txt", "old_string": "nonexistent", "new_string": "x"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        let err = EditTool
            .execute(
                json!({"file_path": "nope.txt", "old_string": "a", "new_string": "b"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[test]
    fn identical_strings_are_rejected() {
        let err = apply_edit("hello", "hello", "hello", false).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn snippet_is_bounded_by_context() {
        let content = (1..=10).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let out = snippet(&content, "line 5").unwrap();
        let numbers: Vec<&str> = out.lines().map(|l| l.split('\t').next().unwrap().trim()).collect();
        assert_eq!(numbers, vec!["2", "3", "4", "5", "6", "7", "8"]);
        assert!(snippet(&content, "").is_none());
    }
}
