// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Scripted mock backend for tests.
//!
//! Each `chat` call pops the next queued [`ChatResponse`]; the requests seen
//! are recorded so tests can assert on what was sent.  No network access.

use std::sync::{Arc, Mutex};
use std::collections::VecDeque;

use async_trait::async_trait;

use crate::backend::{Backend, BackendState, TextStream};
use crate::{BackendError, BackendErrorKind, ChatResponse, Message, TokenUsage, ToolCall};

/// A single recorded chat request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_count: usize,
}

pub struct MockBackend {
    state: BackendState,
    scripts: Mutex<VecDeque<Result<ChatResponse, BackendError>>>,
    /// Every request seen, in call order.
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn new(scripts: Vec<Result<ChatResponse, BackendError>>) -> Self {
        Self {
            state: BackendState::new("mock-model", None),
            scripts: Mutex::new(scripts.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Backend that always answers with the same text.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(vec![Ok(ChatResponse::text(reply))])
    }

    /// Backend scripted for one tool round: a tool call, then a text reply.
    pub fn tool_then_text(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        arguments: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        let mut first = ChatResponse::with_tool_calls(
            "",
            vec![ToolCall::new(call_id, tool, arguments)],
        );
        first.usage = Some(TokenUsage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 });
        let mut second = ChatResponse::text(final_text);
        second.usage = Some(TokenUsage { prompt_tokens: 20, completion_tokens: 5, total_tokens: 25 });
        Self::new(vec![Ok(first), Ok(second)])
    }

    /// The number of scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn state(&self) -> &BackendState {
        &self.state
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<ChatResponse, BackendError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tool_count: tools.len(),
        });
        let next = self.scripts.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => {
                let capped = ChatResponse {
                    tool_calls: self.state.apply_parallel_cap(response.tool_calls),
                    ..response
                };
                self.state.record_usage(capped.usage);
                Ok(capped)
            }
            Some(Err(e)) => Err(e),
            None => Err(BackendError::new(
                "mock script exhausted",
                BackendErrorKind::Unknown,
            )),
        }
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<TextStream, BackendError> {
        let response = self.chat(messages, &[]).await?;
        let chunks: Vec<Result<String, BackendError>> = response
            .content
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec![self.model()])
    }

    async fn health_check(&self) -> bool {
        true
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
