use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};

use super::resolve_path;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "Glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern, most recently modified first"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (e.g. '**/*.rs', 'src/**/*.{ts,tsx}')"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (defaults to working directory)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let pattern = require_str(&args, "pattern")?;
        let base_dir = match args["path"].as_str() {
            Some(p) => resolve_path(p, &ctx.working_directory),
            None => ctx.working_directory.clone(),
        };

        let patterns: Vec<String> = expand_braces(pattern)
            .into_iter()
            .map(|p| base_dir.join(p).to_string_lossy().into_owned())
            .collect();
        for p in &patterns {
            ::glob::Pattern::new(p)
                .map_err(|e| ToolError::InvalidArguments(format!("invalid pattern: {e}")))?;
        }

        let matches = tokio::task::spawn_blocking(move || find_matches(&patterns))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("glob task failed: {e}")))?;

        if matches.is_empty() {
            return Ok("No files matched the pattern.".into());
        }
        Ok(matches
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn find_matches(patterns: &[String]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for pattern in patterns {
        if let Ok(entries) = ::glob::glob(pattern) {
            found.extend(entries.flatten().filter(|p| p.is_file()));
        }
    }

    let mut with_mtime: Vec<(SystemTime, PathBuf)> = found
        .into_iter()
        .map(|p| {
            let mtime = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (mtime, p)
        })
        .collect();
    with_mtime.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    with_mtime.into_iter().map(|(_, p)| p).collect()
}

/// Expand the first `{a,b}` group, recursively. Patterns without braces pass through.
pub(crate) fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };
    let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);
    pattern[open + 1..close]
        .split(',')
        .flat_map(|option| expand_braces(&format!("{prefix}{option}{suffix}")))
        .collect()
}
