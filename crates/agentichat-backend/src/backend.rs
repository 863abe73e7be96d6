// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tracing::warn;

use crate::{BackendError, ChatResponse, Message, TokenUsage, ToolCall};

/// Lazy sequence of text fragments from a streaming chat call, terminated by
/// the end of the underlying stream.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Per-turn usage accumulator.  Reset by the agentic loop at turn start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CumulativeUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Number of successful chat responses since the last reset.
    pub api_calls: u64,
}

/// Retry progress published while a backoff sleep is pending, so the UI can
/// show "retry 2/3 in 4s" on the spinner line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInfo {
    /// 1-based attempt number of the retry about to run.
    pub attempt: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub status_code: Option<u16>,
}

/// Bookkeeping shared by every adapter: the mutable model name, usage
/// counters, and in-flight retry state.  Adapters embed one and expose it
/// through [`Backend::state`]; the trait's provided methods read and write it.
#[derive(Debug, Default)]
pub struct BackendState {
    model: Mutex<String>,
    last_usage: Mutex<Option<TokenUsage>>,
    cumulative: Mutex<CumulativeUsage>,
    retry_info: Mutex<Option<RetryInfo>>,
    max_parallel_tools: Mutex<Option<usize>>,
}

impl BackendState {
    pub fn new(model: impl Into<String>, max_parallel_tools: Option<usize>) -> Self {
        Self {
            model: Mutex::new(model.into()),
            max_parallel_tools: Mutex::new(max_parallel_tools),
            ..Default::default()
        }
    }

    /// Record the usage of one successful response: sets `last_usage` and
    /// folds it into the cumulative counters.
    pub fn record_usage(&self, usage: Option<TokenUsage>) {
        *self.last_usage.lock().unwrap() = usage;
        let mut cumulative = self.cumulative.lock().unwrap();
        if let Some(u) = usage {
            cumulative.prompt_tokens += u.prompt_tokens;
            cumulative.completion_tokens += u.completion_tokens;
            cumulative.total_tokens += u.prompt_tokens + u.completion_tokens;
        }
        cumulative.api_calls += 1;
    }

    /// Truncate a parsed tool-call list to the configured parallel cap.
    pub fn apply_parallel_cap(&self, calls: Option<Vec<ToolCall>>) -> Option<Vec<ToolCall>> {
        let cap = *self.max_parallel_tools.lock().unwrap();
        match (calls, cap) {
            (Some(mut calls), Some(cap)) if calls.len() > cap => {
                warn!(cap, dropped = calls.len() - cap, "truncating parallel tool calls");
                calls.truncate(cap);
                Some(calls)
            }
            (calls, _) => calls,
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable adapter/config name for status display.
    fn name(&self) -> &str;

    /// Shared bookkeeping; backs all the provided methods below.
    fn state(&self) -> &BackendState;

    /// One complete request/response exchange.  `tools` carries the registry
    /// schemas in the function-envelope shape; empty means no tool calling.
    /// Non-streaming calls go through the retry policy.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<ChatResponse, BackendError>;

    /// Streaming chat for the plain (tool-free) path.  Not retried; the
    /// stream ends when the server signals completion.
    async fn chat_stream(&self, messages: &[Message]) -> Result<TextStream, BackendError>;

    async fn list_models(&self) -> Result<Vec<String>, BackendError>;

    /// Cheap reachability probe; never errors.
    async fn health_check(&self) -> bool;

    // ── Provided bookkeeping accessors ────────────────────────────────────────

    fn model(&self) -> String {
        self.state().model.lock().unwrap().clone()
    }

    fn set_model(&self, model: String) {
        *self.state().model.lock().unwrap() = model;
    }

    fn last_usage(&self) -> Option<TokenUsage> {
        *self.state().last_usage.lock().unwrap()
    }

    fn cumulative_usage(&self) -> CumulativeUsage {
        *self.state().cumulative.lock().unwrap()
    }

    fn reset_cumulative_usage(&self) {
        *self.state().cumulative.lock().unwrap() = CumulativeUsage::default();
    }

    fn retry_info(&self) -> Option<RetryInfo> {
        *self.state().retry_info.lock().unwrap()
    }

    fn max_parallel_tools(&self) -> Option<usize> {
        *self.state().max_parallel_tools.lock().unwrap()
    }

    fn set_max_parallel_tools(&self, cap: Option<usize>) {
        *self.state().max_parallel_tools.lock().unwrap() = cap;
    }
}

/// Number of retries after the original attempt.
pub(crate) const MAX_RETRIES: u32 = 3;
/// Initial backoff delay; doubles on every retry (2 s, 4 s, 8 s).
pub(crate) const BASE_DELAY: Duration = Duration::from_secs(2);

/// Run `attempt` with exponential backoff on retryable errors.
///
/// Publishes [`RetryInfo`] into `state` while a backoff sleep is pending and
/// clears it on success or final failure.  Non-retryable errors propagate
/// immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    state: &BackendState,
    mut attempt: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    *state.retry_info.lock().unwrap() = None;
    let mut delay = BASE_DELAY;

    for attempt_no in 0..=MAX_RETRIES {
        match attempt().await {
            Ok(value) => {
                *state.retry_info.lock().unwrap() = None;
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt_no < MAX_RETRIES => {
                warn!(
                    kind = ?err.kind,
                    status = ?err.status_code,
                    retry = attempt_no + 1,
                    delay_secs = delay.as_secs(),
                    "backend error, retrying"
                );
                *state.retry_info.lock().unwrap() = Some(RetryInfo {
                    attempt: attempt_no + 1,
                    max_retries: MAX_RETRIES,
                    delay,
                    status_code: err.status_code,
                });
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                *state.retry_info.lock().unwrap() = None;
                return Err(err);
            }
        }
    }
    unreachable!("final attempt either returns or errors");
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
