// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::sandbox::Sandbox;
use crate::tool::{arg_bool, arg_str, Tool, ToolResult};

/// Grep-like recursive text search.  Unreadable and oversized files are
/// skipped silently; matched lines are trimmed.
pub struct SearchTextTool {
    sandbox: Arc<Sandbox>,
}

impl SearchTextTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }

    fn search_file(&self, file: &Path, re: &regex::Regex, matches: &mut Vec<Value>) {
        let Ok(bytes) = std::fs::read(file) else {
            return;
        };
        let content = String::from_utf8_lossy(&bytes);
        let rel = file
            .strip_prefix(self.sandbox.root())
            .unwrap_or(file)
            .to_string_lossy()
            .to_string();
        for (idx, line) in content.lines().enumerate() {
            if re.is_match(line) {
                matches.push(json!({
                    "file": rel,
                    "line": idx + 1,
                    "content": line.trim(),
                }));
            }
        }
    }
}

#[async_trait]
impl Tool for SearchTextTool {
    fn name(&self) -> &str {
        "search_text"
    }

    fn description(&self) -> &str {
        "Search for text in files (grep-like). Recurses through all \
         subdirectories automatically; ignored directories are pruned unless \
         include_ignored=true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text or regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search from (default: .)"
                },
                "regex": {
                    "type": "boolean",
                    "description": "Treat the query as a regular expression (default: false)",
                    "default": false
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Match case exactly (default: false)",
                    "default": false
                },
                "include_ignored": {
                    "type": "boolean",
                    "description": "Search normally ignored directories (default: false)",
                    "default": false
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(query) = arg_str(args, "query") else {
            return ToolResult::err("missing 'query'");
        };
        let path = arg_str(args, "path").unwrap_or(".");
        let use_regex = arg_bool(args, "regex", false);
        let case_sensitive = arg_bool(args, "case_sensitive", false);
        let include_ignored = arg_bool(args, "include_ignored", false);

        debug!(query, path, use_regex, "search_text tool");

        let root = match self.sandbox.validate(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::err(e.to_string()),
        };
        if !root.exists() {
            return ToolResult::err(format!("Path '{path}' not found"));
        }

        let pattern = if use_regex {
            query.to_string()
        } else {
            regex::escape(query)
        };
        let re = match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("invalid regex: {e}")),
        };

        let mut matches = Vec::new();
        let mut ignored_count = 0usize;

        if root.is_file() {
            self.search_file(&root, &re, &mut matches);
        } else {
            for entry in WalkDir::new(&root).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if !include_ignored && self.sandbox.should_ignore(entry.path()) {
                    ignored_count += 1;
                    continue;
                }
                if self.sandbox.check_size(entry.path()).is_err() {
                    continue;
                }
                self.search_file(entry.path(), &re, &mut matches);
            }
        }

        let mut result = json!({
            "query": query,
            "matches": matches,
            "count": matches.len(),
        });
        if ignored_count > 0 {
            result["ignored_count"] = json!(ignored_count);
            result["note"] = json!(format!(
                "{ignored_count} files skipped in ignored directories (.venv, node_modules, ...)"
            ));
        }
        ToolResult::ok(result)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agentichat_config::SandboxConfig;
    use std::fs;

    fn tool(root: &Path) -> SearchTextTool {
        SearchTextTool::new(Arc::new(Sandbox::new(root, &SandboxConfig::default())))
    }

    #[tokio::test]
    async fn finds_matches_with_line_numbers_and_trimmed_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "first\n   needle here   \nlast").unwrap();
        let out = tool(dir.path()).execute(&json!({"query": "needle"})).await;
        assert!(out.success());
        let j = out.to_json();
        assert_eq!(j["count"], 1);
        assert_eq!(j["matches"][0]["file"], "f.txt");
        assert_eq!(j["matches"][0]["line"], 2);
        assert_eq!(j["matches"][0]["content"], "needle here");
    }

    #[tokio::test]
    async fn search_is_case_insensitive_by_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), "NEEDLE").unwrap();
        let out = tool(dir.path()).execute(&json!({"query": "needle"})).await;
        assert_eq!(out.to_json()["count"], 1);

        let strict = tool(dir.path())
            .execute(&json!({"query": "needle", "case_sensitive": true}))
            .await;
        assert_eq!(strict.to_json()["count"], 0);
    }

    #[tokio::test]
    async fn plain_query_escapes_regex_metacharacters() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), "a.b\naxb").unwrap();
        let out = tool(dir.path()).execute(&json!({"query": "a.b"})).await;
        // only the literal "a.b" line matches
        assert_eq!(out.to_json()["count"], 1);
    }

    #[tokio::test]
    async fn regex_mode_enables_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), "value=42\nvalue=x").unwrap();
        let out = tool(dir.path())
            .execute(&json!({"query": r"value=\d+", "regex": true}))
            .await;
        assert_eq!(out.to_json()["count"], 1);
    }

    #[tokio::test]
    async fn invalid_regex_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = tool(dir.path())
            .execute(&json!({"query": "([", "regex": true}))
            .await;
        assert!(!out.success());
        assert!(out.error_message().unwrap().contains("invalid regex"));
    }

    #[tokio::test]
    async fn recursive_search_prunes_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.js"), "needle").unwrap();
        fs::write(dir.path().join("app.js"), "needle").unwrap();

        let out = tool(dir.path()).execute(&json!({"query": "needle"})).await;
        let j = out.to_json();
        assert_eq!(j["count"], 1);
        assert_eq!(j["matches"][0]["file"], "app.js");
        assert_eq!(j["ignored_count"], 1);

        let all = tool(dir.path())
            .execute(&json!({"query": "needle", "include_ignored": true}))
            .await;
        assert_eq!(all.to_json()["count"], 2);
    }

    #[tokio::test]
    async fn oversized_files_are_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.txt"), "needle ".repeat(10)).unwrap();
        fs::write(dir.path().join("small.txt"), "needle").unwrap();
        let cfg = SandboxConfig { max_file_size: 16, ..SandboxConfig::default() };
        let t = SearchTextTool::new(Arc::new(Sandbox::new(dir.path(), &cfg)));

        let out = t.execute(&json!({"query": "needle"})).await;
        assert!(out.success());
        let j = out.to_json();
        assert_eq!(j["count"], 1);
        assert_eq!(j["matches"][0]["file"], "small.txt");
    }

    #[tokio::test]
    async fn single_file_target_is_searched_directly() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("only.txt"), "needle").unwrap();
        let out = tool(dir.path())
            .execute(&json!({"query": "needle", "path": "only.txt"}))
            .await;
        assert_eq!(out.to_json()["count"], 1);
    }
}
