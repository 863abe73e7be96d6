// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use agentichat_tools::ToolRegistry;

/// Build the default system preamble describing the tool-calling convention
/// and the available tools with their argument names.
///
/// Injected by the agentic loop when the transcript has no system message
/// and the registry is non-empty.  Kept in sync with the registry rather
/// than hard-coded so provider-specific auxiliary tools appear
/// automatically.
pub fn default_system_preamble(registry: &ToolRegistry) -> String {
    let mut tool_lines = String::new();
    for tool in registry.list() {
        let params: Vec<String> = tool
            .parameters_schema()
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        let first_sentence = tool
            .description()
            .split('.')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        tool_lines.push_str(&format!(
            "- {} : {} (params: {})\n",
            tool.name(),
            first_sentence,
            if params.is_empty() { "none".to_string() } else { params.join(", ") },
        ));
    }

    format!(
        "You are an AI assistant with access to tools for interacting with \
         the file system, the shell, and the web, and for tracking tasks.\n\n\
         When the user asks for something, call the appropriate tools using \
         this format:\n\n\
         ```json\n\
         {{\"name\": \"tool_name\", \"arguments\": {{\"param1\": \"value1\"}}}}\n\
         ```\n\n\
         Available tools:\n\n\
         {tool_lines}\n\
         Example, to read test.py:\n\
         ```json\n\
         {{\"name\": \"read_file\", \"arguments\": {{\"path\": \"test.py\"}}}}\n\
         ```\n\n\
         IMPORTANT: call the tools directly; do NOT explain to the user how \
         to use them."
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use agentichat_tools::{Tool, ToolResult};
    use serde_json::{json, Value};

    struct FakeTool;

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            "fake_tool"
        }
        fn description(&self) -> &str {
            "Does a fake thing. With a second sentence."
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"alpha": {}, "beta": {}}})
        }
        async fn execute(&self, _args: &Value) -> ToolResult {
            ToolResult::ok(Value::Null)
        }
    }

    #[test]
    fn preamble_lists_tools_with_parameter_names() {
        let mut reg = ToolRegistry::new();
        reg.register(FakeTool);
        let preamble = default_system_preamble(&reg);
        assert!(preamble.contains("fake_tool"));
        assert!(preamble.contains("alpha"));
        assert!(preamble.contains("beta"));
        // only the first sentence of the description
        assert!(preamble.contains("Does a fake thing"));
        assert!(!preamble.contains("second sentence"));
    }

    #[test]
    fn preamble_describes_the_calling_convention() {
        let reg = ToolRegistry::new();
        let preamble = default_system_preamble(&reg);
        assert!(preamble.contains("\"arguments\""));
        assert!(preamble.contains("```json"));
    }
}
