// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::{Tool, ToolResult};

/// Central catalogue of tools, keyed by name.
///
/// Registered at startup and immutable during a turn; the backend switch
/// tears provider-specific entries down and registers the new ones before
/// the next turn starts.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Insert a tool; a duplicate name overrides the previous entry.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Export every tool in the function-envelope shape the backends expect.
    pub fn schemas(&self) -> Vec<Value> {
        self.list()
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    /// Dispatch a call by name.  An unknown name yields a structured error
    /// result, never a crash.
    pub async fn execute(&self, name: &str, args: &Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => ToolResult::err(format!("Tool '{name}' not found")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"x": {"type": "integer"}}})
        }
        async fn execute(&self, args: &Value) -> ToolResult {
            ToolResult::ok(json!({"echo": args.clone()}))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_name_overrides() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t" });
        reg.register(EchoTool { name: "t" });
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "zeta" });
        reg.register(EchoTool { name: "alpha" });
        assert_eq!(reg.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn schemas_use_the_function_envelope() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let schemas = reg.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["function"]["name"], "echo");
        assert_eq!(schemas[0]["function"]["description"], "echoes its arguments");
        assert!(schemas[0]["function"]["parameters"].is_object());
    }

    #[tokio::test]
    async fn execute_dispatches_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let out = reg.execute("echo", &json!({"x": 1})).await;
        assert!(out.success());
        assert_eq!(out.to_json()["echo"]["x"], 1);
    }

    #[tokio::test]
    async fn unknown_tool_yields_structured_error() {
        let reg = ToolRegistry::new();
        let out = reg.execute("missing", &json!({})).await;
        assert!(!out.success());
        assert_eq!(out.error_message(), Some("Tool 'missing' not found"));
    }

    #[test]
    fn unregister_removes_entry() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.unregister("echo"));
        assert!(!reg.unregister("echo"));
        assert!(reg.is_empty());
    }
}
