// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::sandbox::Sandbox;
use crate::tool::{arg_bool, arg_str, Tool, ToolResult};

/// List files in a directory, optionally recursive, with filename pattern
/// filtering and advisory ignore pruning.
pub struct ListFilesTool {
    sandbox: Arc<Sandbox>,
}

impl ListFilesTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory. Set recursive=true to include all subdirectories. \
         Ignored directories (.venv, node_modules, .git, ...) are pruned unless \
         include_ignored=true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the workspace (default: .)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Walk all subdirectories recursively (default: false)",
                    "default": false
                },
                "pattern": {
                    "type": "string",
                    "description": "Filename glob filter, e.g. '*.py'"
                },
                "include_ignored": {
                    "type": "boolean",
                    "description": "Include normally ignored directories (default: false)",
                    "default": false
                }
            }
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let path = arg_str(args, "path").unwrap_or(".");
        let recursive = arg_bool(args, "recursive", false);
        let pattern = arg_str(args, "pattern");
        let include_ignored = arg_bool(args, "include_ignored", false);

        debug!(path, recursive, "list_files tool");

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

        let name_filter = match pattern {
            Some(p) => match filename_glob_to_regex(p) {
                Some(re) => Some(re),
                None => return ToolResult::err(format!("invalid pattern '{p}'")),
            },
            None => None,
        };
        let name_matches = |name: &str| -> bool {
            name_filter.as_ref().map(|re| re.is_match(name)).unwrap_or(true)
        };

        let mut files = Vec::new();
        let mut ignored_count = 0usize;

        if recursive {
            for entry in WalkDir::new(&dir).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if !include_ignored && self.sandbox.should_ignore(entry.path()) {
                    ignored_count += 1;
                    continue;
                }
                if !name_matches(&entry.file_name().to_string_lossy()) {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(self.sandbox.root()) {
                    files.push(rel.to_string_lossy().to_string());
                }
            }
        } else {
            let entries = match std::fs::read_dir(&dir) {
                Ok(e) => e,
                Err(e) => return ToolResult::err(format!("cannot read '{path}': {e}")),
            };
            for entry in entries.filter_map(Result::ok) {
                let meta_is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                if !meta_is_file || !name_matches(&entry.file_name().to_string_lossy()) {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(self.sandbox.root()) {
                    files.push(rel.to_string_lossy().to_string());
                }
            }
        }

        files.sort();
        let mut result = json!({"files": files, "count": files.len()});
        if ignored_count > 0 {
            result["ignored_count"] = json!(ignored_count);
            result["note"] = json!(format!(
                "{ignored_count} files skipped in ignored directories (.venv, node_modules, ...)"
            ));
        }
        ToolResult::ok(result)
    }
}

/// Compile a filename glob (single path segment) like `*.py` into a regex.
fn filename_glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

/// Read a file as lossy UTF-8, optionally windowed to a 1-indexed inclusive
/// line range.
pub struct ReadFileTool {
    sandbox: Arc<Sandbox>,
}

impl ReadFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the content of a file. Optional start_line/end_line select a \
         1-indexed inclusive line range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "start_line": {
                    "type": "integer",
                    "description": "First line to return (1-indexed, optional)"
                },
                "end_line": {
                    "type": "integer",
                    "description": "Last line to return (1-indexed inclusive, optional)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(path) = arg_str(args, "path") else {
            return ToolResult::err("missing 'path'");
        };
        let start_line = args.get("start_line").and_then(Value::as_u64);
        let end_line = args.get("end_line").and_then(Value::as_u64);

        debug!(path, "read_file tool");

        let file = match self.sandbox.validate(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !file.exists() {
            return ToolResult::err(format!("File '{path}' not found"));
        }
        if !file.is_file() {
            return ToolResult::err(format!("'{path}' is not a file"));
        }
        if let Err(e) = self.sandbox.check_size(&file) {
            return ToolResult::err(e.to_string());
        }

        let bytes = match tokio::fs::read(&file).await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("cannot read '{path}': {e}")),
        };
        let mut content = String::from_utf8_lossy(&bytes).to_string();

        if start_line.is_some() || end_line.is_some() {
            let lines: Vec<&str> = content.lines().collect();
            let start = start_line.map(|n| (n.max(1) - 1) as usize).unwrap_or(0);
            let end = end_line.map(|n| n as usize).unwrap_or(lines.len()).min(lines.len());
            content = if start >= end {
                String::new()
            } else {
                lines[start..end].join("\n")
            };
        }

        ToolResult::ok(json!({"content": content, "path": path}))
    }
}

/// Create or modify a file.  Destructive: gated behind confirmation.
pub struct WriteFileTool {
    sandbox: Arc<Sandbox>,
}

impl WriteFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or modify a file. mode=create refuses to replace an existing \
         file; mode=overwrite replaces it; mode=append adds to the end. \
         Parent directories are created as needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                },
                "mode": {
                    "type": "string",
                    "enum": ["create", "overwrite", "append"],
                    "description": "Write mode (default: create)",
                    "default": "create"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(path) = arg_str(args, "path") else {
            return ToolResult::err("missing 'path'");
        };
        let Some(content) = arg_str(args, "content") else {
            return ToolResult::err("missing 'content'");
        };
        let mode = arg_str(args, "mode").unwrap_or("create");

        debug!(path, mode, bytes = content.len(), "write_file tool");

        let file = match self.sandbox.validate(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };

        if mode == "create" && file.exists() {
            return ToolResult::err(format!(
                "File '{path}' already exists (use mode='overwrite')"
            ));
        }

        if let Some(parent) = file.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolResult::err(format!("cannot create parent directory: {e}"));
                }
            }
        }

        let write_result = if mode == "append" {
            use tokio::io::AsyncWriteExt;
            match tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&file)
                .await
            {
                Ok(mut f) => f.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(&file, content).await
        };

        match write_result {
            Ok(()) => ToolResult::ok(json!({
                "path": path,
                "bytes_written": content.len(),
            })),
            Err(e) => ToolResult::err(format!("write error: {e}")),
        }
    }
}

/// Unlink a regular file.  Destructive: gated behind confirmation.
pub struct DeleteFileTool {
    sandbox: Arc<Sandbox>,
}

impl DeleteFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
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

        debug!(path, "delete_file tool");

        let file = match self.sandbox.validate(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !file.exists() {
            return ToolResult::err(format!("File '{path}' not found"));
        }
        if !file.is_file() {
            return ToolResult::err(format!("'{path}' is not a file"));
        }

        match tokio::fs::remove_file(&file).await {
            Ok(()) => ToolResult::ok(json!({"path": path, "deleted": true})),
            Err(e) => ToolResult::err(format!("delete error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
