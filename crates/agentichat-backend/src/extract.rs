// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Recovery of tool calls from plain response text.
//!
//! Small models frequently emit tool invocations as text instead of the
//! provider's structured field.  This module scans assistant content for the
//! known textual syntaxes and converts them into [`ToolCall`]s:
//!
//! 1. `[TOOL_CALLS]tool_name{...json...}`
//! 2. `[TOOL_CALLS]{"function": "tool_name", ...arguments...}`
//! 3. Fenced ```json blocks holding `{"name": ..., "arguments"|"parameters": {...}}`
//!    objects (several may sit back-to-back in one block)
//! 4. The same object shape inline in the text (only when nothing else matched)
//! 5. XML style: `<tool_call><function=NAME><parameter=K>V</parameter>...</function></tool_call>`
//!
//! Every extracted call receives a freshly generated opaque id.  Candidates
//! that fail to decode are dropped silently after one repair attempt that
//! escapes stray backslashes (regex fragments like `\s+` inside JSON).
//!
//! A `[TOOL_CALLS]` marker is an extraction boundary only at top level:
//! once a JSON body is being consumed, marker text inside its string
//! literals is treated as data and scanning resumes after the body.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::ToolCall;

const MARKER: &str = "[TOOL_CALLS]";

/// Scan `content` for textual tool invocations in all supported formats.
/// Returns calls in the order they appear, format by format.
pub fn extract_tool_calls(content: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    extract_marker_calls(content, &mut calls);
    extract_fenced_calls(content, &mut calls);
    if calls.is_empty() {
        extract_inline_calls(content, &mut calls);
    }
    extract_xml_calls(content, &mut calls);
    calls
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

// ─── Formats 1 & 2: [TOOL_CALLS] markers ─────────────────────────────────────

fn extract_marker_calls(content: &str, calls: &mut Vec<ToolCall>) {
    let mut cursor = 0;
    while let Some(found) = content[cursor..].find(MARKER) {
        let marker_end = cursor + found + MARKER.len();
        let rest = &content[marker_end..];

        // `[TOOL_CALLS]name{...}` — identifier, optional whitespace, body.
        let name_len = rest
            .char_indices()
            .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let after_name = rest[name_len..].trim_start();
        let ws = rest.len() - name_len - after_name.len();
        let brace_offset = marker_end + name_len + ws;

        if !after_name.starts_with('{') {
            cursor = marker_end;
            continue;
        }
        let Some(body_end) = match_balanced(content, brace_offset) else {
            // Unterminated body — nothing more to extract from this marker.
            cursor = marker_end;
            continue;
        };
        let body = &content[brace_offset..body_end];

        if name_len > 0 {
            let name = &rest[..name_len];
            if let Some(args) = parse_json_lenient(body) {
                let arguments = if args.is_object() { args } else { json!({}) };
                debug!(tool = name, "extracted [TOOL_CALLS]name call");
                calls.push(ToolCall::new(fresh_id(), name, arguments));
            }
        } else if let Some(Value::Object(mut obj)) = parse_json_lenient(body) {
            // `[TOOL_CALLS]{"function": name, ...}` — the object names the
            // tool under "function"; every remaining key is an argument.
            if let Some(Value::String(name)) = obj.remove("function") {
                debug!(tool = %name, "extracted [TOOL_CALLS]{{function}} call");
                calls.push(ToolCall::new(fresh_id(), name, Value::Object(obj)));
            }
        }
        // Resume after the consumed body; markers inside it were data.
        cursor = body_end;
    }
}

// ─── Format 3: fenced ```json blocks ─────────────────────────────────────────

fn fenced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.+?)\s*```").unwrap())
}

fn extract_fenced_calls(content: &str, calls: &mut Vec<ToolCall>) {
    for cap in fenced_re().captures_iter(content) {
        let block = cap.get(1).unwrap().as_str();
        // One block may carry several back-to-back objects.
        let mut pos = 0;
        while let Some(brace) = block[pos..].find('{').map(|i| pos + i) {
            let Some(end) = match_balanced(block, brace) else {
                break;
            };
            if let Some(call) = named_object_to_call(&block[brace..end]) {
                calls.push(call);
            }
            pos = end;
        }
    }
}

// ─── Format 4: inline JSON objects ───────────────────────────────────────────

fn inline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{[^{}]*"name"[^{}]*\{[^}]*\}[^{}]*\}"#).unwrap())
}

fn extract_inline_calls(content: &str, calls: &mut Vec<ToolCall>) {
    for m in inline_re().find_iter(content) {
        if let Some(call) = named_object_to_call(m.as_str()) {
            calls.push(call);
        }
    }
}

/// Decode a `{"name": ..., "arguments"|"parameters": {...}}` candidate.
fn named_object_to_call(text: &str) -> Option<ToolCall> {
    let Value::Object(obj) = parse_json_lenient(text)? else {
        return None;
    };
    let name = obj.get("name")?.as_str()?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let arguments = obj
        .get("arguments")
        .or_else(|| obj.get("parameters"))
        .filter(|v| v.is_object())
        .cloned()
        .unwrap_or_else(|| json!({}));
    debug!(tool = %name, "extracted JSON-object call");
    Some(ToolCall::new(fresh_id(), name, arguments))
}

// ─── Format 5: XML tags ──────────────────────────────────────────────────────

fn xml_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<tool_call>\s*<function=(\w+)>(.*?)</function>\s*</tool_call>").unwrap()
    })
}

fn xml_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<parameter=(\w+)>(.*?)</parameter>").unwrap())
}

fn extract_xml_calls(content: &str, calls: &mut Vec<ToolCall>) {
    for cap in xml_call_re().captures_iter(content) {
        let name = cap.get(1).unwrap().as_str();
        let params_block = cap.get(2).unwrap().as_str();
        let mut arguments = Map::new();
        for p in xml_param_re().captures_iter(params_block) {
            arguments.insert(
                p.get(1).unwrap().as_str().to_string(),
                Value::String(p.get(2).unwrap().as_str().trim().to_string()),
            );
        }
        debug!(tool = name, "extracted XML call");
        calls.push(ToolCall::new(fresh_id(), name, Value::Object(arguments)));
    }
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Find the end (exclusive byte index) of the JSON object starting at
/// `start` (which must point at `{`), honouring string literals and escape
/// sequences.  Returns `None` when the object never closes.
fn match_balanced(content: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in content[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a JSON candidate; on failure retry once with stray backslashes
/// escaped, then give up.
fn parse_json_lenient(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok().or_else(|| {
        let fixed = fix_stray_backslashes(text);
        match serde_json::from_str(&fixed) {
            Ok(v) => {
                debug!("parsed JSON after escaping stray backslashes");
                Some(v)
            }
            Err(_) => None,
        }
    })
}

/// Escape backslashes that do not begin a valid JSON escape sequence.
/// Models embedding regex fragments (`\s+`, `\d`, `\.`) in argument strings
/// produce such bodies.
fn fix_stray_backslashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Format 1: [TOOL_CALLS]name{...} ───────────────────────────────────────

    #[test]
    fn marker_named_form_extracts_one_call() {
        let calls = extract_tool_calls(r#"[TOOL_CALLS]read_file{"path": "src/main.rs"}"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], "src/main.rs");
        assert!(!calls[0].id.is_empty());
    }

    #[test]
    fn marker_named_form_allows_whitespace_before_brace() {
        let calls = extract_tool_calls(r#"[TOOL_CALLS]list_files {"path": "."}"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "list_files");
    }

    #[test]
    fn marker_named_form_handles_escaped_quotes_and_braces_in_strings() {
        let calls = extract_tool_calls(
            r#"[TOOL_CALLS]write_file{"path": "a.txt", "content": "say \"hi\" and {braces}"}"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["content"], "say \"hi\" and {braces}");
    }

    #[test]
    fn marker_named_form_with_nested_object() {
        let calls =
            extract_tool_calls(r#"[TOOL_CALLS]todo_write{"todos": [{"content": "x", "status": "pending"}]}"#);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments["todos"].is_array());
    }

    #[test]
    fn marker_inside_argument_string_is_not_a_boundary() {
        let calls = extract_tool_calls(
            r#"[TOOL_CALLS]write_file{"path": "x", "content": "literal [TOOL_CALLS]demo{\"a\":1} text"}"#,
        );
        assert_eq!(calls.len(), 1, "marker inside a JSON string must not split extraction");
        assert_eq!(calls[0].name, "write_file");
    }

    #[test]
    fn marker_with_invalid_json_is_dropped_silently() {
        let calls = extract_tool_calls("[TOOL_CALLS]broken{not json at all}");
        assert!(calls.is_empty());
    }

    #[test]
    fn two_markers_extract_two_calls_in_order() {
        let calls = extract_tool_calls(
            r#"[TOOL_CALLS]read_file{"path": "a"} then [TOOL_CALLS]read_file{"path": "b"}"#,
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["path"], "a");
        assert_eq!(calls[1].arguments["path"], "b");
    }

    // ── Format 2: [TOOL_CALLS]{"function": ...} ───────────────────────────────

    #[test]
    fn marker_function_form_moves_remaining_keys_to_arguments() {
        let calls =
            extract_tool_calls(r#"[TOOL_CALLS]{"function": "shell_exec", "command": "ls", "timeout": 5}"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "shell_exec");
        assert_eq!(calls[0].arguments["command"], "ls");
        assert_eq!(calls[0].arguments["timeout"], 5);
        assert!(calls[0].arguments.get("function").is_none());
    }

    #[test]
    fn marker_object_without_function_key_is_ignored() {
        let calls = extract_tool_calls(r#"[TOOL_CALLS]{"just": "data"}"#);
        assert!(calls.is_empty());
    }

    // ── Format 3: fenced JSON blocks ──────────────────────────────────────────

    #[test]
    fn fenced_block_extracts_single_call() {
        let content = "Let me check.\n```json\n{\"name\":\"read_file\",\"arguments\":{\"path\":\"x\"}}\n```";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], "x");
    }

    #[test]
    fn fenced_block_supports_parameters_alias() {
        let content = "```json\n{\"name\": \"glob_search\", \"parameters\": {\"pattern\": \"*.rs\"}}\n```";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["pattern"], "*.rs");
    }

    #[test]
    fn fenced_block_with_multiple_objects_extracts_all() {
        let content = "```json\n\
            {\"name\": \"read_file\", \"arguments\": {\"path\": \"a\"}}\n\
            {\"name\": \"read_file\", \"arguments\": {\"path\": \"b\"}}\n\
            ```";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["path"], "a");
        assert_eq!(calls[1].arguments["path"], "b");
    }

    #[test]
    fn fenced_block_without_name_yields_nothing() {
        let calls = extract_tool_calls("```json\n{\"data\": 42}\n```");
        assert!(calls.is_empty());
    }

    #[test]
    fn fenced_block_with_empty_name_is_rejected() {
        let calls = extract_tool_calls("```json\n{\"name\": \"  \", \"arguments\": {}}\n```");
        assert!(calls.is_empty());
    }

    #[test]
    fn fenced_block_non_object_arguments_default_to_empty() {
        let calls =
            extract_tool_calls("```json\n{\"name\": \"list_files\", \"arguments\": \"oops\"}\n```");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    // ── Format 4: inline JSON ─────────────────────────────────────────────────

    #[test]
    fn inline_json_is_used_when_no_fenced_block_matched() {
        let content = r#"I will call {"name": "read_file", "arguments": {"path": "x"}} now."#;
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
    }

    #[test]
    fn inline_json_skipped_when_fenced_block_already_matched() {
        let content = "```json\n{\"name\": \"a_tool\", \"arguments\": {\"k\": \"v\"}}\n```\n\
                       and also {\"name\": \"b_tool\", \"arguments\": {\"k\": \"v\"}}";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "a_tool");
    }

    // ── Format 5: XML ─────────────────────────────────────────────────────────

    #[test]
    fn xml_form_extracts_name_and_parameters() {
        let content = "<tool_call><function=list_files><parameter=path>.</parameter>\
                       <parameter=recursive>true</parameter></function></tool_call>";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "list_files");
        assert_eq!(calls[0].arguments["path"], ".");
        assert_eq!(calls[0].arguments["recursive"], "true");
    }

    #[test]
    fn xml_form_trims_parameter_values() {
        let content =
            "<tool_call><function=read_file><parameter=path>\n  src/lib.rs\n</parameter></function></tool_call>";
        let calls = extract_tool_calls(content);
        assert_eq!(calls[0].arguments["path"], "src/lib.rs");
    }

    #[test]
    fn xml_form_without_parameters_gives_empty_arguments() {
        let content = "<tool_call><function=list_files></function></tool_call>";
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    // ── Backslash repair ──────────────────────────────────────────────────────

    #[test]
    fn stray_regex_backslashes_are_repaired() {
        let content = r#"```json
{"name": "search_text", "arguments": {"query": "\d+\s*words", "regex": true}}
```"#;
        let calls = extract_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["query"], r"\d+\s*words");
    }

    #[test]
    fn valid_escapes_survive_the_repair_pass() {
        assert_eq!(fix_stray_backslashes(r#"a\nb\"c\\d"#), r#"a\nb\"c\\d"#);
    }

    #[test]
    fn stray_backslashes_are_doubled() {
        assert_eq!(fix_stray_backslashes(r"\d+\s"), r"\\d+\\s");
    }

    #[test]
    fn trailing_backslash_is_doubled() {
        assert_eq!(fix_stray_backslashes(r"x\"), r"x\\");
    }

    // ── General behaviour ─────────────────────────────────────────────────────

    #[test]
    fn plain_prose_extracts_nothing() {
        let calls = extract_tool_calls("Here are three ways to improve your code: {be brief}.");
        assert!(calls.is_empty());
    }

    #[test]
    fn each_extracted_call_gets_a_unique_id() {
        let calls = extract_tool_calls(
            r#"[TOOL_CALLS]read_file{"path": "a"}[TOOL_CALLS]read_file{"path": "b"}"#,
        );
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn balanced_matcher_rejects_unterminated_object() {
        assert!(match_balanced(r#"{"a": {"b": 1}"#, 0).is_none());
    }

    #[test]
    fn balanced_matcher_finds_object_end() {
        let s = r#"{"a": {"b": "}"}} trailing"#;
        let end = match_balanced(s, 0).unwrap();
        assert_eq!(&s[..end], r#"{"a": {"b": "}"}}"#);
    }
}
