// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolResult};

const STATUSES: [&str; 3] = ["pending", "in_progress", "completed"];

/// Maintain the per-project todo list.  The whole list is overwritten on
/// every call.
pub struct TodoWriteTool {
    todo_file: PathBuf,
}

impl TodoWriteTool {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { todo_file: data_dir.join("current_todos.json") }
    }

    pub fn todo_file(&self) -> &PathBuf {
        &self.todo_file
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Create or update the task list for tracking multi-step work. Each \
         task needs content, a status (pending/in_progress/completed), and \
         an active_form (present-continuous label shown while running). The \
         submitted list replaces the stored one."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "Complete list of tasks to record",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {
                                "type": "string",
                                "description": "Task description (imperative form)"
                            },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"],
                                "description": "Task status"
                            },
                            "active_form": {
                                "type": "string",
                                "description": "Present-continuous label, e.g. 'Creating the file'"
                            }
                        },
                        "required": ["content", "status", "active_form"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(todos) = args.get("todos").and_then(Value::as_array) else {
            return ToolResult::err("missing 'todos'");
        };

        for (i, todo) in todos.iter().enumerate() {
            for key in ["content", "status", "active_form"] {
                if todo.get(key).and_then(Value::as_str).is_none() {
                    return ToolResult::err(format!("Task {}: missing '{key}'", i + 1));
                }
            }
            let status = todo["status"].as_str().unwrap_or_default();
            if !STATUSES.contains(&status) {
                return ToolResult::err(format!("Task {}: invalid status '{status}'", i + 1));
            }
        }

        debug!(count = todos.len(), file = %self.todo_file.display(), "todo_write tool");

        if let Some(parent) = self.todo_file.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(format!("cannot create data directory: {e}"));
            }
        }
        let payload = json!({"todos": todos});
        let text = serde_json::to_string_pretty(&payload).unwrap_or_default();
        if let Err(e) = tokio::fs::write(&self.todo_file, text).await {
            return ToolResult::err(format!("cannot save todos: {e}"));
        }

        let count_by = |status: &str| todos.iter().filter(|t| t["status"] == status).count();
        ToolResult::ok(json!({
            "total_tasks": todos.len(),
            "pending": count_by("pending"),
            "in_progress": count_by("in_progress"),
            "completed": count_by("completed"),
        }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn todo(content: &str, status: &str) -> Value {
        json!({"content": content, "status": status, "active_form": format!("{content}...")})
    }

    #[tokio::test]
    async fn writes_list_and_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let t = TodoWriteTool::new(dir.path().to_path_buf());
        let out = t
            .execute(&json!({"todos": [
                todo("write code", "completed"),
                todo("run tests", "in_progress"),
                todo("ship it", "pending"),
            ]}))
            .await;
        assert!(out.success());
        let j = out.to_json();
        assert_eq!(j["total_tasks"], 3);
        assert_eq!(j["pending"], 1);
        assert_eq!(j["in_progress"], 1);
        assert_eq!(j["completed"], 1);

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(t.todo_file()).unwrap()).unwrap();
        assert_eq!(saved["todos"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn each_call_replaces_the_stored_list() {
        let dir = tempfile::tempdir().unwrap();
        let t = TodoWriteTool::new(dir.path().to_path_buf());
        t.execute(&json!({"todos": [todo("a", "pending"), todo("b", "pending")]}))
            .await;
        t.execute(&json!({"todos": [todo("only", "completed")]})).await;

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(t.todo_file()).unwrap()).unwrap();
        assert_eq!(saved["todos"].as_array().unwrap().len(), 1);
        assert_eq!(saved["todos"][0]["content"], "only");
    }

    #[tokio::test]
    async fn missing_field_is_rejected_with_position() {
        let dir = tempfile::tempdir().unwrap();
        let t = TodoWriteTool::new(dir.path().to_path_buf());
        let out = t
            .execute(&json!({"todos": [
                todo("ok", "pending"),
                {"content": "no status", "active_form": "x"},
            ]}))
            .await;
        assert!(!out.success());
        assert!(out.error_message().unwrap().contains("Task 2"));
    }

    #[tokio::test]
    async fn invalid_status_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let t = TodoWriteTool::new(dir.path().to_path_buf());
        let out = t.execute(&json!({"todos": [todo("x", "doing")]})).await;
        assert!(!out.success());
        assert!(out.error_message().unwrap().contains("invalid status"));
    }

    #[tokio::test]
    async fn empty_list_clears_the_todos() {
        let dir = tempfile::tempdir().unwrap();
        let t = TodoWriteTool::new(dir.path().to_path_buf());
        let out = t.execute(&json!({"todos": []})).await;
        assert!(out.success());
        assert_eq!(out.to_json()["total_tasks"], 0);
    }
}
