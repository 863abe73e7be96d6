// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::sandbox::Sandbox;
use crate::tool::{arg_bool, arg_str, Tool, ToolResult};

/// Find files matching a glob pattern under a base directory.
pub struct GlobSearchTool {
    sandbox: Arc<Sandbox>,
}

impl GlobSearchTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for GlobSearchTool {
    fn name(&self) -> &str {
        "glob_search"
    }

    fn description(&self) -> &str {
        "Find files by glob pattern. Examples: '*.py' (direct children), \
         '**/*.js' (recursive), 'src/**/*.tsx' (recursive under src/)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. '*.py', '**/*.js', 'src/**/*.tsx'"
                },
                "path": {
                    "type": "string",
                    "description": "Base directory for the search (default: .)",
                    "default": "."
                },
                "exclude": {
                    "type": "string",
                    "description": "Glob of paths to exclude, e.g. '**/__pycache__/**'"
                },
                "include_ignored": {
                    "type": "boolean",
                    "description": "Match inside normally ignored directories (default: false)",
                    "default": false
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(pattern) = arg_str(args, "pattern") else {
            return ToolResult::err("missing 'pattern'");
        };
        let path = arg_str(args, "path").unwrap_or(".");
        let exclude = arg_str(args, "exclude");
        let include_ignored = arg_bool(args, "include_ignored", false);

        debug!(pattern, path, "glob_search tool");

        let base = match self.sandbox.validate(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !base.exists() {
            return ToolResult::err(format!("Directory '{path}' not found"));
        }
        if !base.is_dir() {
            return ToolResult::err(format!("'{path}' is not a directory"));
        }

        let Some(re) = path_glob_to_regex(pattern) else {
            return ToolResult::err(format!("invalid glob pattern '{pattern}'"));
        };
        let exclude_re = match exclude {
            Some(e) => match path_glob_to_regex(e) {
                Some(r) => Some(r),
                None => return ToolResult::err(format!("invalid exclude pattern '{e}'")),
            },
            None => None,
        };

        let mut matches = Vec::new();
        for entry in WalkDir::new(&base).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            // Pattern matching is relative to the base directory; output
            // paths are relative to the workspace root.
            let Ok(rel_to_base) = entry.path().strip_prefix(&base) else {
                continue;
            };
            let rel_str = rel_to_base.to_string_lossy().replace('\\', "/");
            if !re.is_match(&rel_str) {
                continue;
            }
            if let Some(ex) = &exclude_re {
                if ex.is_match(&rel_str) {
                    continue;
                }
            }
            if !include_ignored && self.sandbox.should_ignore(entry.path()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(self.sandbox.root()) {
                matches.push(rel.to_string_lossy().to_string());
            }
        }
        matches.sort();

        ToolResult::ok(json!({
            "matches": matches,
            "count": matches.len(),
            "pattern": pattern,
            "search_dir": path,
        }))
    }
}

/// Path-aware glob translation: `*`/`?` stay within one segment, `**`
/// crosses segments, `**/` also matches the empty prefix.
fn path_glob_to_regex(pattern: &str) -> Option<Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                re.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                re.push_str("[^/]");
                i += 1;
            }
            c => {
                re.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
