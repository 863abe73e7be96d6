// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{Map, Value};

/// The structured result of a tool execution.
///
/// Rendered as a flat JSON object carrying `success` plus either result
/// fields or an `error` string.  The agentic loop serializes this into the
/// content of a tool-role message, so the model always sees the `success`
/// flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    success: bool,
    fields: Map<String, Value>,
}

impl ToolResult {
    /// Successful result with additional fields.  `fields` must be a JSON
    /// object (or `null` for no extra fields).
    pub fn ok(fields: Value) -> Self {
        Self { success: true, fields: into_map(fields) }
    }

    /// Failed result carrying an error message.
    pub fn err(message: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("error".into(), Value::String(message.into()));
        Self { success: false, fields }
    }

    /// Failed result with additional context fields (e.g. captured output of
    /// a non-zero shell exit).
    pub fn fail(fields: Value) -> Self {
        Self { success: false, fields: into_map(fields) }
    }

    /// The structured refusal produced when the user rejects a destructive
    /// call at the confirmation gate.  Fed back to the model verbatim so it
    /// can recover or explain.
    pub fn user_rejected() -> Self {
        let mut fields = Map::new();
        fields.insert("error".into(), Value::String("USER_REJECTED".into()));
        fields.insert(
            "message".into(),
            Value::String("The user declined this operation.".into()),
        );
        Self { success: false, fields }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.fields.get("error").and_then(Value::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Render as the canonical `{"success": ..., ...}` object.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::with_capacity(self.fields.len() + 1);
        obj.insert("success".into(), Value::Bool(self.success));
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}

fn into_map(fields: Value) -> Map<String, Value> {
    match fields {
        Value::Object(m) => m,
        Value::Null => Map::new(),
        other => {
            let mut m = Map::new();
            m.insert("result".into(), other);
            m
        }
    }
}

/// Trait implemented by every tool in the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the argument object.
    fn parameters_schema(&self) -> Value;
    /// Destructive tools pass through the confirmation gate before running.
    /// This is a static property of the tool, not of the call.
    fn requires_confirmation(&self) -> bool {
        false
    }
    /// Execute with the (untyped) argument object.  Faults must be wrapped
    /// in [`ToolResult::err`]; tools never panic.
    async fn execute(&self, args: &Value) -> ToolResult;
}

// ── Argument accessors shared by the built-in tools ──────────────────────────

pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub(crate) fn arg_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn arg_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
