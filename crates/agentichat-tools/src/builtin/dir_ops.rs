// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::sandbox::Sandbox;
use crate::tool::{arg_bool, arg_str, Tool, ToolResult};

pub struct CreateDirectoryTool {
    sandbox: Arc<Sandbox>,
}

impl CreateDirectoryTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a new directory. Fails if it already exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace"
                },
                "parents": {
                    "type": "boolean",
                    "description": "Create missing parent directories (default: true)",
                    "default": true
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(path) = arg_str(args, "path") else {
            return ToolResult::err("missing 'path'");
        };
        let parents = arg_bool(args, "parents", true);

        debug!(path, parents, "create_directory tool");

        let dir = match self.sandbox.validate(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if dir.exists() {
            return if dir.is_dir() {
                ToolResult::err(format!("Directory '{path}' already exists"))
            } else {
                ToolResult::err(format!("'{path}' exists and is not a directory"))
            };
        }

        let result = if parents {
            tokio::fs::create_dir_all(&dir).await
        } else {
            tokio::fs::create_dir(&dir).await
        };
        match result {
            Ok(()) => ToolResult::ok(json!({"path": path, "created": true})),
            Err(e) => ToolResult::err(format!("cannot create '{path}': {e}")),
        }
    }
}

/// Remove a directory.  Destructive: gated behind confirmation.
pub struct DeleteDirectoryTool {
    sandbox: Arc<Sandbox>,
}

impl DeleteDirectoryTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for DeleteDirectoryTool {
    fn name(&self) -> &str {
        "delete_directory"
    }

    fn description(&self) -> &str {
        "Delete a directory. A non-empty directory is refused unless \
         recursive=true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Delete contents recursively (default: false)",
                    "default": false
                }
            },
            "required": ["path"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(path) = arg_str(args, "path") else {
            return ToolResult::err("missing 'path'");
        };
        let recursive = arg_bool(args, "recursive", false);

        debug!(path, recursive, "delete_directory tool");

        let dir = match self.sandbox.validate(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !dir.exists() {
            return ToolResult::err(format!("Directory '{path}' not found"));
        }
        if !dir.is_dir() {
            return ToolResult::err(format!("'{path}' is not a directory"));
        }

        let non_empty = std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if non_empty && !recursive {
            return ToolResult::err(format!(
                "Directory '{path}' is not empty; pass recursive=true to delete its contents"
            ));
        }

        let result = if recursive {
            tokio::fs::remove_dir_all(&dir).await
        } else {
            tokio::fs::remove_dir(&dir).await
        };
        match result {
            Ok(()) => ToolResult::ok(json!({"path": path, "deleted": true})),
            Err(e) => ToolResult::err(format!("cannot delete '{path}': {e}")),
        }
    }
}

pub struct MoveFileTool {
    sandbox: Arc<Sandbox>,
}

impl MoveFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file or directory within the workspace. An existing \
         destination is refused unless overwrite=true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Source path relative to the workspace"
                },
                "destination": {
                    "type": "string",
                    "description": "Destination path relative to the workspace"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Replace an existing destination (default: false)",
                    "default": false
                }
            },
            "required": ["source", "destination"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(source) = arg_str(args, "source") else {
            return ToolResult::err("missing 'source'");
        };
        let Some(destination) = arg_str(args, "destination") else {
            return ToolResult::err("missing 'destination'");
        };
        let overwrite = arg_bool(args, "overwrite", false);

        debug!(source, destination, "move_file tool");

        let src = match self.sandbox.validate(source) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        let dst = match self.sandbox.validate(destination) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !src.exists() {
            return ToolResult::err(format!("'{source}' not found"));
        }
        if dst.exists() && !overwrite {
            return ToolResult::err(format!(
                "'{destination}' already exists (use overwrite=true)"
            ));
        }
        if let Some(parent) = dst.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        match tokio::fs::rename(&src, &dst).await {
            Ok(()) => ToolResult::ok(json!({
                "source": source,
                "destination": destination,
                "moved": true,
            })),
            Err(e) => ToolResult::err(format!("move error: {e}")),
        }
    }
}

pub struct CopyFileTool {
    sandbox: Arc<Sandbox>,
}

impl CopyFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CopyFileTool {
    fn name(&self) -> &str {
        "copy_file"
    }

    fn description(&self) -> &str {
        "Copy a file, or a directory recursively, within the workspace. An \
         existing destination is refused unless overwrite=true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Source path relative to the workspace"
                },
                "destination": {
                    "type": "string",
                    "description": "Destination path relative to the workspace"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Replace an existing destination (default: false)",
                    "default": false
                }
            },
            "required": ["source", "destination"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(source) = arg_str(args, "source") else {
            return ToolResult::err("missing 'source'");
        };
        let Some(destination) = arg_str(args, "destination") else {
            return ToolResult::err("missing 'destination'");
        };
        let overwrite = arg_bool(args, "overwrite", false);

        debug!(source, destination, "copy_file tool");

        let src = match self.sandbox.validate(source) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        let dst = match self.sandbox.validate(destination) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !src.exists() {
            return ToolResult::err(format!("'{source}' not found"));
        }
        if dst.exists() && !overwrite {
            return ToolResult::err(format!(
                "'{destination}' already exists (use overwrite=true)"
            ));
        }
        if let Some(parent) = dst.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        let result = if src.is_dir() {
            copy_dir_recursive(&src, &dst)
        } else {
            std::fs::copy(&src, &dst).map(|_| ())
        };
        match result {
            Ok(()) => ToolResult::ok(json!({
                "source": source,
                "destination": destination,
                "copied": true,
            })),
            Err(e) => ToolResult::err(format!("copy error: {e}")),
        }
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agentichat_config::SandboxConfig;
    use std::fs;

    fn sandbox(root: &Path) -> Arc<Sandbox> {
        Arc::new(Sandbox::new(root, &SandboxConfig::default()))
    }

    // ── create_directory ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_directory_succeeds_once() {
        let dir = tempfile::tempdir().unwrap();
        let t = CreateDirectoryTool::new(sandbox(dir.path()));
        let out = t.execute(&json!({"path": "newdir"})).await;
        assert!(out.success());
        assert!(dir.path().join("newdir").is_dir());

        let again = t.execute(&json!({"path": "newdir"})).await;
        assert!(!again.success());
        assert!(again.error_message().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn create_directory_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let t = CreateDirectoryTool::new(sandbox(dir.path()));
        let out = t.execute(&json!({"path": "a/b/c"})).await;
        assert!(out.success());
        assert!(dir.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn create_directory_without_parents_fails_on_missing_chain() {
        let dir = tempfile::tempdir().unwrap();
        let t = CreateDirectoryTool::new(sandbox(dir.path()));
        let out = t.execute(&json!({"path": "x/y", "parents": false})).await;
        assert!(!out.success());
    }

    // ── delete_directory ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn delete_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        let t = DeleteDirectoryTool::new(sandbox(dir.path()));
        let out = t.execute(&json!({"path": "d"})).await;
        assert!(out.success());
        assert!(!dir.path().join("d").exists());
    }

    #[tokio::test]
    async fn delete_non_empty_directory_requires_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d/f"), "x").unwrap();
        let t = DeleteDirectoryTool::new(sandbox(dir.path()));

        let refused = t.execute(&json!({"path": "d"})).await;
        assert!(!refused.success());
        assert!(refused.error_message().unwrap().contains("recursive"));

        let out = t.execute(&json!({"path": "d", "recursive": true})).await;
        assert!(out.success());
        assert!(!dir.path().join("d").exists());
    }

    // ── move_file ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn move_file_renames_within_workspace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "data").unwrap();
        let t = MoveFileTool::new(sandbox(dir.path()));
        let out = t
            .execute(&json!({"source": "a.txt", "destination": "b.txt"}))
            .await;
        assert!(out.success());
        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "data");
    }

    #[tokio::test]
    async fn move_file_refuses_existing_destination_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "1").unwrap();
        fs::write(dir.path().join("b"), "2").unwrap();
        let t = MoveFileTool::new(sandbox(dir.path()));

        let refused = t.execute(&json!({"source": "a", "destination": "b"})).await;
        assert!(!refused.success());

        let out = t
            .execute(&json!({"source": "a", "destination": "b", "overwrite": true}))
            .await;
        assert!(out.success());
        assert_eq!(fs::read_to_string(dir.path().join("b")).unwrap(), "1");
    }

    // ── copy_file ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn copy_file_duplicates_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "payload").unwrap();
        let t = CopyFileTool::new(sandbox(dir.path()));
        let out = t.execute(&json!({"source": "a", "destination": "b"})).await;
        assert!(out.success());
        assert_eq!(fs::read_to_string(dir.path().join("a")).unwrap(), "payload");
        assert_eq!(fs::read_to_string(dir.path().join("b")).unwrap(), "payload");
    }

    #[tokio::test]
    async fn copy_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/inner")).unwrap();
        fs::write(dir.path().join("src/f1"), "1").unwrap();
        fs::write(dir.path().join("src/inner/f2"), "2").unwrap();
        let t = CopyFileTool::new(sandbox(dir.path()));
        let out = t.execute(&json!({"source": "src", "destination": "dup"})).await;
        assert!(out.success());
        assert_eq!(fs::read_to_string(dir.path().join("dup/f1")).unwrap(), "1");
        assert_eq!(fs::read_to_string(dir.path().join("dup/inner/f2")).unwrap(), "2");
    }

    #[tokio::test]
    async fn copy_missing_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let t = CopyFileTool::new(sandbox(dir.path()));
        let out = t.execute(&json!({"source": "ghost", "destination": "d"})).await;
        assert!(!out.success());
    }
}
