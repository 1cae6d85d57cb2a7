use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use klaude_core::tools::{require_str, Tool, ToolContext, ToolError};
use regex::{Regex, RegexBuilder};

use super::glob::expand_braces;
use super::{is_skipped_dir, resolve_path};

pub struct GrepTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Content,
    FilesWithMatches,
    Count,
}

impl OutputMode {
    fn parse(value: Option<&str>) -> Result<Self, ToolError> {
        match value {
            None | Some("files_with_matches") => Ok(Self::FilesWithMatches),
            Some("content") => Ok(Self::Content),
            Some("count") => Ok(Self::Count),
            Some(other) => Err(ToolError::InvalidArguments(format!(
                "unknown output_mode: {other}"
            ))),
        }
    }
}

struct SearchOptions {
    regex: Regex,
    multiline: bool,
    mode: OutputMode,
    line_numbers: bool,
    before: usize,
    after: usize,
    filter: Vec<::glob::Pattern>,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "Grep"
    }

    fn description(&self) -> &str {
        "Search file contents using regex patterns"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in (defaults to working directory)"
                },
                "glob": {
                    "type": "string",
                    "description": "Glob pattern to filter files (e.g. '*.rs', '*.{ts,tsx}')"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"],
                    "description": "Output mode (default: files_with_matches)"
                },
                "-i": {"type": "boolean", "description": "Case insensitive search"},
                "-n": {"type": "boolean", "description": "Show line numbers (content mode)"},
                "-A": {"type": "integer", "description": "Lines of context after each match (content mode)"},
                "-B": {"type": "integer", "description": "Lines of context before each match (content mode)"},
                "-C": {"type": "integer", "description": "Lines of context around each match (content mode)"},
                "multiline": {
                    "type": "boolean",
                    "description": "Let patterns span lines and '.' match newlines"
                },
                "head_limit": {
                    "type": "integer",
                    "description": "Limit output to the first N entries"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let pattern = require_str(&args, "pattern")?;
        let search_path = match args["path"].as_str() {
            Some(p) => resolve_path(p, &ctx.working_directory),
            None => ctx.working_directory.clone(),
        };
        if !search_path.exists() {
            return Err(ToolError::ExecutionFailed(format!(
                "path does not exist: {}",
                search_path.display()
            )));
        }

        let multiline = args["multiline"].as_bool().unwrap_or(false);
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(args["-i"].as_bool().unwrap_or(false))
            .multi_line(multiline)
            .dot_matches_new_line(multiline)
            .build()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex: {e}")))?;

        let filter = match args["glob"].as_str() {
            Some(g) => expand_braces(g)
                .iter()
                .map(|p| ::glob::Pattern::new(p))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ToolError::InvalidArguments(format!("invalid glob: {e}")))?,
            None => Vec::new(),
        };

        let context = as_count(&args["-C"]);
        let options = SearchOptions {
            regex,
            multiline,
            mode: OutputMode::parse(args["output_mode"].as_str())?,
            line_numbers: args["-n"].as_bool().unwrap_or(false),
            before: args["-B"].as_u64().map(|n| n as usize).unwrap_or(context),
            after: args["-A"].as_u64().map(|n| n as usize).unwrap_or(context),
            filter,
        };
        let head_limit = as_count(&args["head_limit"]);

        let entries = tokio::task::spawn_blocking(move || search(&search_path, &options))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("search task failed: {e}")))?;

        if entries.is_empty() {
            return Ok("No matches found.".into());
        }
        let shown = if head_limit > 0 { head_limit.min(entries.len()) } else { entries.len() };
        Ok(entries[..shown].join("\n"))
    }
}

fn as_count(value: &serde_json::Value) -> usize {
    value.as_u64().map(|n| n as usize).unwrap_or(0)
}

fn search(root: &Path, options: &SearchOptions) -> Vec<String> {
    let files = if root.is_file() {
        vec![root.to_path_buf()]
    } else {
        let mut files = Vec::new();
        collect_files(root, root, &options.filter, &mut files);
        files
    };

    let mut entries = Vec::new();
    for file in files {
        // Unreadable and non-UTF-8 files are skipped.
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let matched = matched_lines(&content, options);
        if matched.is_empty() {
            continue;
        }
        let name = file.display().to_string();
        match options.mode {
            OutputMode::FilesWithMatches => entries.push(name),
            OutputMode::Count => entries.push(format!("{name}:{}", matched.len())),
            OutputMode::Content => format_content(&name, &content, &matched, options, &mut entries),
        }
    }
    entries
}

fn collect_files(root: &Path, dir: &Path, filter: &[::glob::Pattern], files: &mut Vec<PathBuf>) {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = read_dir.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if path.is_dir() {
            if !is_skipped_dir(name) {
                collect_files(root, &path, filter, files);
            }
        } else if path.is_file() && passes_filter(root, &path, name, filter) {
            files.push(path);
        }
    }
}

fn passes_filter(root: &Path, path: &Path, name: &str, filter: &[::glob::Pattern]) -> bool {
    if filter.is_empty() {
        return true;
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    filter
        .iter()
        .any(|p| p.matches(name) || p.matches_path(relative))
}

/// Zero-based indices of the lines that hold a match.
fn matched_lines(content: &str, options: &SearchOptions) -> Vec<usize> {
    if !options.multiline {
        return content
            .lines()
            .enumerate()
            .filter(|(_, line)| options.regex.is_match(line))
            .map(|(i, _)| i)
            .collect();
    }

    let line_of = |offset: usize| content[..offset].matches('\n').count();
    let mut lines = Vec::new();
    for m in options.regex.find_iter(content) {
        let first = line_of(m.start());
        let last = first + m.as_str().trim_end_matches('\n').matches('\n').count();
        lines.extend(first..=last);
    }
    lines.sort_unstable();
    lines.dedup();
    lines
}

fn format_content(
    name: &str,
    content: &str,
    matched: &[usize],
    options: &SearchOptions,
    out: &mut Vec<String>,
) {
    let lines: Vec<&str> = content.lines().collect();
    let mut shown: BTreeMap<usize, bool> = BTreeMap::new();
    for &idx in matched {
        let start = idx.saturating_sub(options.before);
        let end = (idx + options.after).min(lines.len().saturating_sub(1));
        for i in start..=end {
            shown.entry(i).or_insert(false);
        }
        shown.insert(idx, true);
    }

    let has_context = options.before > 0 || options.after > 0;
    let mut previous: Option<usize> = None;
    for (&i, &is_match) in &shown {
        let Some(line) = lines.get(i) else {
            continue;
        };
        if has_context && previous.is_some_and(|p| i > p + 1) {
            out.push("--".into());
        }
        let sep = if is_match { ':' } else { '-' };
        if options.line_numbers {
            out.push(format!("{name}{sep}{}{sep}{line}", i + 1));
        } else {
            out.push(format!("{name}{sep}{line}"));
        }
        previous = Some(i);
    }
}
