// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
pub mod dir_ops;
pub mod file_ops;
pub mod glob;
pub mod search;
pub mod shell;
pub mod todo;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

use crate::{Sandbox, ToolRegistry};

pub use dir_ops::{CopyFileTool, CreateDirectoryTool, DeleteDirectoryTool, MoveFileTool};
pub use file_ops::{DeleteFileTool, ListFilesTool, ReadFileTool, WriteFileTool};
pub use glob::GlobSearchTool;
pub use search::SearchTextTool;
pub use shell::ShellExecTool;
pub use todo::TodoWriteTool;
pub use web::{WebFetchTool, WebSearchTool};

/// Register the complete built-in tool set against a shared sandbox.
/// `data_dir` is the per-project state directory (todo list storage).
pub fn register_builtin(registry: &mut ToolRegistry, sandbox: Arc<Sandbox>, data_dir: PathBuf) {
    registry.register(ListFilesTool::new(Arc::clone(&sandbox)));
    registry.register(ReadFileTool::new(Arc::clone(&sandbox)));
    registry.register(WriteFileTool::new(Arc::clone(&sandbox)));
    registry.register(DeleteFileTool::new(Arc::clone(&sandbox)));
    registry.register(SearchTextTool::new(Arc::clone(&sandbox)));
    registry.register(GlobSearchTool::new(Arc::clone(&sandbox)));
    registry.register(CreateDirectoryTool::new(Arc::clone(&sandbox)));
    registry.register(DeleteDirectoryTool::new(Arc::clone(&sandbox)));
    registry.register(MoveFileTool::new(Arc::clone(&sandbox)));
    registry.register(CopyFileTool::new(Arc::clone(&sandbox)));
    registry.register(ShellExecTool::new(sandbox));
    registry.register(WebFetchTool::new());
    registry.register(WebSearchTool::new());
    registry.register(TodoWriteTool::new(data_dir));
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agentichat_config::SandboxConfig;

    #[test]
    fn register_builtin_installs_the_full_tool_set() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path(), &SandboxConfig::default()));
        let mut reg = ToolRegistry::new();
        register_builtin(&mut reg, sandbox, dir.path().join(".agentichat"));

        let names = reg.names();
        for expected in [
            "copy_file",
            "create_directory",
            "delete_directory",
            "delete_file",
            "glob_search",
            "list_files",
            "move_file",
            "read_file",
            "search_text",
            "shell_exec",
            "todo_write",
            "web_fetch",
            "web_search",
            "write_file",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(names.len(), 14);
    }

    #[test]
    fn destructive_tools_require_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path(), &SandboxConfig::default()));
        let mut reg = ToolRegistry::new();
        register_builtin(&mut reg, sandbox, dir.path().join(".agentichat"));

        for name in ["write_file", "delete_file", "delete_directory", "shell_exec"] {
            assert!(reg.get(name).unwrap().requires_confirmation(), "{name}");
        }
        for name in ["read_file", "list_files", "search_text", "glob_search", "move_file",
                     "copy_file", "create_directory", "web_fetch", "web_search", "todo_write"] {
            assert!(!reg.get(name).unwrap().requires_confirmation(), "{name}");
        }
    }
}
