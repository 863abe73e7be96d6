// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Adapter for a local model runtime speaking the Ollama wire format.
//!
//! `POST /api/chat` with sampling parameters nested under `options`;
//! streaming is newline-delimited JSON ending with `{"done": true}`;
//! `GET /api/tags` lists installed models.  Unlike the hosted dialect,
//! tool-call `arguments` travel as JSON objects, not strings, and no
//! authentication is used.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use agentichat_config::BackendConfig;

use crate::backend::{retry_with_backoff, Backend, BackendState, TextStream};
use crate::extract::extract_tool_calls;
use crate::{BackendError, BackendErrorKind, ChatResponse, FinishReason, Message, TokenUsage, ToolCall};

pub struct OllamaBackend {
    name: String,
    url: String,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
    state: BackendState,
}

impl OllamaBackend {
    pub fn from_config(name: &str, cfg: &BackendConfig) -> Self {
        Self {
            name: name.to_string(),
            url: cfg.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.timeout),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            client: reqwest::Client::new(),
            state: BackendState::new(cfg.model.clone(), cfg.max_parallel_tools),
        }
    }

    fn build_payload(&self, messages: &[Message], tools: &[Value], stream: bool) -> Value {
        let mut payload = json!({
            "model": self.model(),
            "messages": build_wire_messages(messages),
            "stream": stream,
            "options": {
                "num_predict": self.max_tokens,
                "temperature": self.temperature,
            },
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
        }
        payload
    }

    async fn send_chat(&self, payload: &Value) -> Result<ChatResponse, BackendError> {
        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
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
        let response = parse_response(&body, &self.state);
        self.state.record_usage(response.usage);
        Ok(response)
    }
}

#[async_trait]
impl Backend for OllamaBackend {
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

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_response(status.as_u16(), &body));
        }

        let stream = resp
            .bytes_stream()
            .scan((String::new(), false), |(buf, done), chunk| {
                let fragments: Vec<Result<String, BackendError>> = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_ndjson_lines(buf, done).into_iter().map(Ok).collect()
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
            .get(format!("{}/api/tags", self.url))
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
        let mut models: Vec<String> = body["models"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        models.sort();
        Ok(models)
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/api/tags", self.url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}

/// Project the transcript into the local-runtime dialect.
/// Tool-call `arguments` remain JSON objects here.
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
                                "arguments": c.arguments,
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

/// Parse a complete `/api/chat` response body.
///
/// The runtime reports native tool calls without ids; each one gets a fresh
/// opaque id so the transcript round-trips through persistence.
pub(crate) fn parse_response(body: &Value, state: &BackendState) -> ChatResponse {
    let message = &body["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();

    let mut tool_calls: Option<Vec<ToolCall>> = message["tool_calls"]
        .as_array()
        .filter(|calls| !calls.is_empty())
        .map(|calls| {
            calls
                .iter()
                .map(|tc| {
                    let func = &tc["function"];
                    let arguments = match &func["arguments"] {
                        Value::Object(o) => Value::Object(o.clone()),
                        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| json!({})),
                        _ => json!({}),
                    };
                    let id = tc["id"]
                        .as_str()
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    ToolCall::new(id, func["name"].as_str().unwrap_or_default(), arguments)
                })
                .collect()
        });

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
    } else if body["done_reason"].as_str() == Some("length") {
        FinishReason::Length
    } else {
        FinishReason::Stop
    };

    let usage = match (
        body["prompt_eval_count"].as_u64(),
        body["eval_count"].as_u64(),
    ) {
        (None, None) => None,
        (prompt, completion) => {
            let prompt = prompt.unwrap_or(0);
            let completion = completion.unwrap_or(0);
            Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            })
        }
    };

    ChatResponse { content, tool_calls, finish_reason, usage }
}

/// Drain complete NDJSON lines from `buf`, returning the content fragments.
/// Sets `done` when the terminator object (`"done": true`) arrives.
pub(crate) fn drain_ndjson_lines(buf: &mut String, done: &mut bool) -> Vec<String> {
    let mut fragments = Vec::new();
    while let Some(nl) = buf.find('\n') {
        let line = buf[..nl].trim_end_matches('\r').to_string();
        *buf = buf[nl + 1..].to_string();
        if *done || line.is_empty() {
            continue;
        }
        let Ok(v) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if v["done"].as_bool() == Some(true) {
            *done = true;
            continue;
        }
        if let Some(text) = v["message"]["content"].as_str() {
            if !text.is_empty() {
                fragments.push(text.to_string());
            }
        }
    }
    fragments
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
