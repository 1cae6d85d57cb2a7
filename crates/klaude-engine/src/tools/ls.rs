use std::path::Path;

use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};

use super::resolve_path;

pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "LS"
    }

    fn description(&self) -> &str {
        "List files and directories as a tree"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list"
                },
                "ignore": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Glob patterns for entry names to leave out"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolve_path(require_str(&args, "path")?, &ctx.working_directory);
        let ignore = match args["ignore"].as_array() {
            Some(items) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(::glob::Pattern::new)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ToolError::InvalidArguments(format!("invalid ignore pattern: {e}")))?,
            None => Vec::new(),
        };

        if !path.is_dir() {
            return Err(ToolError::ExecutionFailed(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        tokio::task::spawn_blocking(move || {
            let mut out = vec![format!("- {}/", path.display())];
            render(&path, "", &ignore, &mut out);
            out.join("\n")
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("listing task failed: {e}")))
    }
}

/// Directories first, then names in order. Ignored entries never take a branch.
fn render(dir: &Path, prefix: &str, ignore: &[::glob::Pattern], out: &mut Vec<String>) {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<(bool, String)> = read_dir
        .flatten()
        .map(|e| (e.path().is_dir(), e.file_name().to_string_lossy().into_owned()))
        .filter(|(_, name)| !ignore.iter().any(|p| p.matches(name)))
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let count = entries.len();
    for (i, (is_dir, name)) in entries.into_iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        if is_dir {
            out.push(format!("{prefix}{branch}{name}/"));
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            render(&dir.join(&name), &child_prefix, ignore, out);
        } else {
            out.push(format!("{prefix}{branch}{name}"));
        }
    }
}
