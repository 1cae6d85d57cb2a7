pub mod bash;
pub mod edit;
pub mod glob;
pub mod grep;
pub mod ls;
pub mod multi_edit;
pub mod read;
pub mod task;
pub mod write;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::registry::ToolRegistry;

/// Registry with every built-in tool.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(read::ReadTool));
    registry.register(Arc::new(write::WriteTool));
    registry.register(Arc::new(edit::EditTool));
    registry.register(Arc::new(multi_edit::MultiEditTool));
    registry.register(Arc::new(glob::GlobTool));
    registry.register(Arc::new(grep::GrepTool));
    registry.register(Arc::new(ls::LsTool));
    registry.register(Arc::new(bash::BashTool::new()));
    registry.register(Arc::new(task::TaskTool));
    registry
}

/// Relative paths are taken from the session's working directory.
pub(crate) fn resolve_path(file_path: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// Directories the search tools never descend into.
pub(crate) fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.')
        || matches!(name, "node_modules" | "target" | "dist" | "build" | "__pycache__" | "vendor")
}
