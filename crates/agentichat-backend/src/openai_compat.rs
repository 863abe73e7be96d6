// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Adapter for hosted OpenAI-compatible chat completion APIs.
//!
//! Speaks `POST /v1/chat/completions` with bearer auth, `GET /v1/models`,
//! and `GET /health`.  Streaming uses SSE frames (`data: {...}\n\n`) with a
//! `data: [DONE]` sentinel.
//!
//! The wire dialect stringifies tool-call `arguments`; the in-memory model
//! keeps them as nested JSON.  That asymmetry is confined to this module:
//! [`build_wire_messages`] encodes on the way out, [`parse_response`]
//! decodes on the way in.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use agentichat_config::BackendConfig;

use crate::backend::{retry_with_backoff, Backend, BackendState, TextStream};
use crate::extract::extract_tool_calls;
use crate::{BackendError, BackendErrorKind, ChatResponse, FinishReason, Message, TokenUsage, ToolCall};

pub struct OpenAiCompatBackend {
    name: String,
    url: String,
    api_key: String,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
    state: BackendState,
}

impl OpenAiCompatBackend {
    pub fn from_config(name: &str, cfg: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            BackendError::new(
                "API key required for an openai-compat backend; add 'api_key' to its configuration",
                BackendErrorKind::AuthError,
            )
        })?;
        Ok(Self {
            name: name.to_string(),
            url: cfg.url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(cfg.timeout),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            client: reqwest::Client::new(),
            state: BackendState::new(cfg.model.clone(), cfg.max_parallel_tools),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.url)
    }

    fn build_payload(&self, messages: &[Message], tools: &[Value], stream: bool) -> Value {
        let mut payload = json!({
            "model": self.model(),
            "messages": build_wire_messages(messages),
            "stream": stream,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
        }
        payload
    }

    async fn send_chat(&self, payload: &Value) -> Result<ChatResponse, BackendError> {
        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_response(status.as_u16(), &body));
        }

        let body: Value = resp.json().await.map_err(|e| {
            BackendError::new(format!("invalid response body: {e}"), BackendErrorKind::Unknown)
        })?;
        let response = parse_response(&body, &self.state)?;
        self.state.record_usage(response.usage);
        Ok(response)
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &BackendState {
        &self.state
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> Result<ChatResponse, BackendError> {
        let payload = self.build_payload(messages, tools, false);
        debug!(
            backend = %self.name,
            model = %self.model(),
            messages = messages.len(),
            tools = tools.len(),
            "sending chat request"
        );
        retry_with_backoff(&self.state, || self.send_chat(&payload)).await
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<TextStream, BackendError> {
        let payload = self.build_payload(messages, &[], true);
        debug!(backend = %self.name, model = %self.model(), "starting streaming chat");

        // No request timeout: the body may stay open indefinitely once the
        // headers have arrived.
        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_response(status.as_u16(), &body));
        }

        // SSE events can be split across TCP packets: keep a line buffer
        // across chunks and only parse complete lines.
        let stream = resp
            .bytes_stream()
            .scan((String::new(), false), |(buf, done), chunk| {
                let fragments: Vec<Result<String, BackendError>> = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_lines(buf, done).into_iter().map(Ok).collect()
                    }
                    Err(e) => vec![Err(BackendError::from_transport(&e))],
                };
                std::future::ready(Some(fragments))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let resp = self
            .client
            .get(format!("{}/v1/models", self.url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_response(status.as_u16(), &body));
        }

        let body: Value = resp.json().await.map_err(|e| {
            BackendError::new(format!("invalid model list: {e}"), BackendErrorKind::Unknown)
        })?;
        let mut models: Vec<String> = body["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        models.sort();
        Ok(models)
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/health", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}

/// Project the transcript into the OpenAI wire dialect.
///
/// Assistant tool calls become `{id, type: "function", function: {name,
/// arguments}}` with `arguments` JSON-encoded as a *string*; tool-role
/// messages carry `tool_call_id`.
pub(crate) fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut wire = json!({
                "role": m.role.to_string(),
                "content": m.content,
            });
            if let Some(calls) = &m.tool_calls {
                wire["tool_calls"] = json!(calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }
            if let Some(id) = &m.tool_call_id {
                wire["tool_call_id"] = json!(id);
            }
            wire
        })
        .collect()
}

/// Decode one native tool call from the wire.  String arguments are
/// JSON-decoded; a decode failure falls back to an empty object.
fn parse_wire_tool_call(tc: &Value) -> ToolCall {
    let func = &tc["function"];
    let arguments = match &func["arguments"] {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| json!({})),
        Value::Object(o) => Value::Object(o.clone()),
        _ => json!({}),
    };
    ToolCall::new(
        tc["id"].as_str().unwrap_or_default(),
        func["name"].as_str().unwrap_or_default(),
        arguments,
    )
}

/// Parse a complete (non-streaming) chat completion body.
pub(crate) fn parse_response(body: &Value, state: &BackendState) -> Result<ChatResponse, BackendError> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| BackendError::new("response carries no choices", BackendErrorKind::Unknown))?;
    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();

    let mut tool_calls: Option<Vec<ToolCall>> = message["tool_calls"]
        .as_array()
        .filter(|calls| !calls.is_empty())
        .map(|calls| calls.iter().map(parse_wire_tool_call).collect());

    // Fallback: the model wrote its tool invocations into the text.
    if tool_calls.is_none() && !content.is_empty() {
        let extracted = extract_tool_calls(&content);
        if !extracted.is_empty() {
            debug!(count = extracted.len(), "using fallback tool-call extraction");
            tool_calls = Some(extracted);
        }
    }

    let tool_calls = state.apply_parallel_cap(tool_calls);

    let finish_reason = if tool_calls.as_ref().is_some_and(|c| !c.is_empty()) {
        FinishReason::ToolCalls
    } else {
        FinishReason::parse(choice["finish_reason"].as_str().unwrap_or("stop"))
    };

    let usage = body.get("usage").filter(|u| u.is_object()).map(|u| TokenUsage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
    });

    Ok(ChatResponse { content, tool_calls, finish_reason, usage })
}

/// Drain all complete `\n`-terminated SSE lines from `buf`, returning the
/// text fragments they carry.  A trailing incomplete line stays in `buf` for
/// the next TCP chunk.  Sets `done` on the `[DONE]` sentinel; later lines
/// are ignored.
pub(crate) fn drain_sse_lines(buf: &mut String, done: &mut bool) -> Vec<String> {
    let mut fragments = Vec::new();
    while let Some(nl) = buf.find('\n') {
        let line = buf[..nl].trim_end_matches('\r').to_string();
        *buf = buf[nl + 1..].to_string();
        if *done {
            continue;
        }
        let Some(data) = line.strip_prefix("data: ").map(str::trim) else {
            continue;
        };
        if data == "[DONE]" {
            *done = true;
            continue;
        }
        if let Ok(v) = serde_json::from_str::<Value>(data) {
            if let Some(text) = v["choices"][0]["delta"]["content"].as_str() {
                if !text.is_empty() {
                    fragments.push(text.to_string());
                }
            }
        }
    }
    fragments
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Wire projection ───────────────────────────────────────────────────────

    #[test]
    fn plain_messages_project_role_and_content() {
        let wire = build_wire_messages(&[Message::system("sys"), Message::user("hi")]);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "sys");
        assert_eq!(wire[1]["role"], "user");
        assert!(wire[1].get("tool_calls").is_none());
    }

    #[test]
    fn assistant_tool_calls_are_stringified_on_the_wire() {
        let msg = Message::assistant_with_calls(
            "",
            vec![ToolCall::new("c1", "read_file", json!({"path": "x"}))],
        );
        let wire = build_wire_messages(&[msg]);
        let call = &wire[0]["tool_calls"][0];
        assert_eq!(call["id"], "c1");
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "read_file");
        // arguments must be a JSON-encoded string, not a nested object
        assert_eq!(call["function"]["arguments"], "{\"path\":\"x\"}");
    }

    #[test]
    fn tool_messages_carry_tool_call_id() {
        let wire = build_wire_messages(&[Message::tool_result("c9", "{\"success\":true}")]);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "c9");
        assert_eq!(wire[0]["content"], "{\"success\":true}");
    }

    // ── Response parsing ──────────────────────────────────────────────────────

    fn state() -> BackendState {
        BackendState::new("m", None)
    }

    #[test]
    fn parse_plain_text_response() {
        let body = json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 2, "total_tokens": 9}
        });
        let r = parse_response(&body, &state()).unwrap();
        assert_eq!(r.content, "hello");
        assert!(!r.has_tool_calls());
        assert_eq!(r.finish_reason, FinishReason::Stop);
        assert_eq!(r.usage.unwrap().total_tokens, 9);
    }

    #[test]
    fn parse_native_tool_call_decodes_string_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "list_files", "arguments": "{\"path\": \".\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let r = parse_response(&body, &state()).unwrap();
        let calls = r.tool_calls.unwrap();
        assert_eq!(calls[0].name, "list_files");
        assert_eq!(calls[0].arguments["path"], ".");
        assert_eq!(r.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn undecodable_string_arguments_fall_back_to_empty_object() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "c",
                        "function": {"name": "t", "arguments": "{{{nope"}
                    }]
                }
            }]
        });
        let r = parse_response(&body, &state()).unwrap();
        assert_eq!(r.tool_calls.unwrap()[0].arguments, json!({}));
    }

    #[test]
    fn fallback_extraction_runs_when_no_native_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "Let me check.\n```json\n{\"name\":\"read_file\",\"arguments\":{\"path\":\"x\"}}\n```"
                },
                "finish_reason": "stop"
            }]
        });
        let r = parse_response(&body, &state()).unwrap();
        let calls = r.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], "x");
        // extraction rewrites the finish reason
        assert_eq!(r.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn parallel_cap_truncates_parsed_calls() {
        let st = BackendState::new("m", Some(1));
        let body = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [
                        {"id": "a", "function": {"name": "t", "arguments": "{}"}},
                        {"id": "b", "function": {"name": "t", "arguments": "{}"}}
                    ]
                }
            }]
        });
        let r = parse_response(&body, &st).unwrap();
        let calls = r.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "a");
    }

    #[test]
    fn missing_choices_is_an_error() {
        let err = parse_response(&json!({"object": "error"}), &state()).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Unknown);
    }

    #[test]
    fn length_finish_reason_is_preserved() {
        let body = json!({
            "choices": [{"message": {"content": "trunca"}, "finish_reason": "length"}]
        });
        let r = parse_response(&body, &state()).unwrap();
        assert_eq!(r.finish_reason, FinishReason::Length);
    }

    // ── SSE line buffer ───────────────────────────────────────────────────────

    #[test]
    fn drain_parses_complete_line() {
        let mut buf = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n".to_string();
        let mut done = false;
        let out = drain_sse_lines(&mut buf, &mut done);
        assert_eq!(out, vec!["hi"]);
        assert!(buf.is_empty());
        assert!(!done);
    }

    #[test]
    fn drain_keeps_incomplete_line_in_buffer() {
        let partial = "data: {\"choices\":[{\"delta\":{\"content\":\"he";
        let mut buf = partial.to_string();
        let mut done = false;
        assert!(drain_sse_lines(&mut buf, &mut done).is_empty());
        assert_eq!(buf, partial);
    }

    #[test]
    fn event_split_across_chunks_is_reassembled() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}\n";
        let (a, b) = line.split_at(line.len() / 2);
        let mut buf = String::new();
        let mut done = false;

        buf.push_str(a);
        assert!(drain_sse_lines(&mut buf, &mut done).is_empty());
        buf.push_str(b);
        assert_eq!(drain_sse_lines(&mut buf, &mut done), vec!["hello"]);
    }

    #[test]
    fn done_sentinel_stops_emission() {
        let mut buf = "data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n".to_string();
        let mut done = false;
        let out = drain_sse_lines(&mut buf, &mut done);
        assert!(out.is_empty());
        assert!(done);
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let mut buf = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n".to_string();
        let mut done = false;
        assert_eq!(drain_sse_lines(&mut buf, &mut done), vec!["x"]);
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let mut buf = ": keepalive\nevent: ping\n\n".to_string();
        let mut done = false;
        assert!(drain_sse_lines(&mut buf, &mut done).is_empty());
        assert!(buf.is_empty());
    }
}
