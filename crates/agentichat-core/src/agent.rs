// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! The agentic loop: a bounded state machine alternating model calls and
//! tool executions for one user turn.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use agentichat_backend::{Backend, BackendError, Message, Role, ToolCall};
use agentichat_tools::{ToolRegistry, ToolResult};

use crate::confirm::ConfirmationGate;
use crate::prompts::default_system_preamble;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The turn was cancelled cooperatively.  The transcript is left in the
    /// consistent state reached so far; the caller must not replay it.
    #[error("turn cancelled")]
    Cancelled,
    /// A non-retryable backend failure aborted the turn.  The transcript
    /// stays usable for the next turn.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Drives one user turn to completion against a backend and a tool registry.
///
/// The transcript is borrowed mutably for the duration of the turn and
/// released back to the caller; messages are only ever appended (plus the
/// one-time system preamble insertion at the front).
pub struct AgentLoop {
    backend: Arc<dyn Backend>,
    registry: Arc<ToolRegistry>,
    gate: Arc<dyn ConfirmationGate>,
    max_iterations: usize,
}

impl AgentLoop {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<ToolRegistry>,
        gate: Arc<dyn ConfirmationGate>,
        max_iterations: usize,
    ) -> Self {
        Self { backend, registry, gate, max_iterations }
    }

    /// Append the user message and run the turn.
    pub async fn submit(
        &self,
        history: &mut Vec<Message>,
        user_input: &str,
    ) -> Result<String, TurnError> {
        history.push(Message::user(user_input));
        self.run(history).await
    }

    /// Run a turn without cancellation (the channel never fires).
    pub async fn run(&self, history: &mut Vec<Message>) -> Result<String, TurnError> {
        let (_keep_alive, mut cancel) = oneshot::channel::<()>();
        self.run_with_cancel(history, &mut cancel).await
    }

    /// Run a turn, checking `cancel` between the HTTP call and tool
    /// execution and between tools.  Both an explicit send and a dropped
    /// sender count as cancellation.
    pub async fn run_with_cancel(
        &self,
        history: &mut Vec<Message>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> Result<String, TurnError> {
        // Fresh per-turn counters.
        self.backend.reset_cumulative_usage();

        // Default preamble when nothing else established a system context.
        let has_system = history.first().map(|m| m.role == Role::System).unwrap_or(false);
        if !has_system && !self.registry.is_empty() {
            history.insert(0, Message::system(default_system_preamble(&self.registry)));
        }

        let schemas = self.registry.schemas();

        for iteration in 1..=self.max_iterations {
            if is_cancelled(cancel) {
                return Err(TurnError::Cancelled);
            }

            debug!(iteration, transcript_len = history.len(), "agent loop iteration");
            let response = tokio::select! {
                biased;
                _ = &mut *cancel => return Err(TurnError::Cancelled),
                result = self.backend.chat(history, &schemas) => result?,
            };

            if !response.has_tool_calls() {
                history.push(Message::assistant(&response.content));
                debug!(iteration, "turn complete");
                return Ok(response.content);
            }

            let calls = response.tool_calls.unwrap_or_default();
            info!(count = calls.len(), iteration, "model requested tool calls");
            history.push(Message::assistant_with_calls(&response.content, calls.clone()));

            for call in &calls {
                if is_cancelled(cancel) {
                    return Err(TurnError::Cancelled);
                }
                let result = self.execute_call(call).await;
                if !result.success() {
                    warn!(tool = %call.name, error = ?result.error_message(), "tool call failed");
                }
                history.push(Message::tool_result(&call.id, result.to_json().to_string()));
            }
        }

        // Cap hit without a tool-free reply; the conversation stays usable.
        let cap_message = format!(
            "Iteration limit reached ({} model calls maximum). The task is too \
             complex for a single request. You can simplify the request, split \
             it into smaller steps, or raise max_iterations in the configuration.",
            self.max_iterations
        );
        warn!(max_iterations = self.max_iterations, "iteration cap reached");
        history.push(Message::assistant(&cap_message));
        Ok(cap_message)
    }

    /// Execute one tool call: registry lookup, confirmation for destructive
    /// tools, fault capture.
    async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolResult::err(format!("Tool '{}' not found", call.name));
        };

        if tool.requires_confirmation() && !self.gate.confirm(&call.name, &call.arguments).await {
            info!(tool = %call.name, "user rejected tool call");
            return ToolResult::user_rejected();
        }

        self.registry.execute(&call.name, &call.arguments).await
    }
}

fn is_cancelled(cancel: &mut oneshot::Receiver<()>) -> bool {
    // A dropped sender reads as Closed, which also means "stop".
    !matches!(cancel.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use agentichat_backend::{BackendErrorKind, ChatResponse, MockBackend};
    use crate::confirm::{AcceptAll, RefuseAll};

    struct EchoTool;

    #[async_trait]
    impl agentichat_tools::Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the arguments back."
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: &Value) -> ToolResult {
            ToolResult::ok(json!({"echo": args.clone()}))
        }
    }

    struct DangerTool;

    #[async_trait]
    impl agentichat_tools::Tool for DangerTool {
        fn name(&self) -> &str {
            "danger"
        }
        fn description(&self) -> &str {
            "A destructive operation."
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn requires_confirmation(&self) -> bool {
            true
        }
        async fn execute(&self, _args: &Value) -> ToolResult {
            ToolResult::ok(json!({"done": true}))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register(DangerTool);
        Arc::new(reg)
    }

    fn agent(mock: MockBackend, gate: Arc<dyn ConfirmationGate>, max: usize) -> (AgentLoop, Arc<MockBackend>) {
        let backend = Arc::new(mock);
        let looper = AgentLoop::new(backend.clone(), registry(), gate, max);
        (looper, backend)
    }

    // ── Happy path, no tools ─────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_reply_appends_one_assistant_message() {
        let backend = Arc::new(MockBackend::always_text("hello"));
        // Empty registry: no preamble injection.
        let looper = AgentLoop::new(
            backend.clone(),
            Arc::new(ToolRegistry::new()),
            Arc::new(AcceptAll),
            10,
        );
        let mut history = vec![Message::user("hi")];
        let reply = looper.run(&mut history).await.unwrap();
        assert_eq!(reply, "hello");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "hello");
    }

    // ── Preamble injection ────────────────────────────────────────────────────

    #[tokio::test]
    async fn preamble_is_injected_when_registry_is_nonempty() {
        let (looper, _) = agent(MockBackend::always_text("ok"), Arc::new(AcceptAll), 10);
        let mut history = vec![Message::user("hi")];
        looper.run(&mut history).await.unwrap();
        assert_eq!(history[0].role, Role::System);
        assert!(history[0].content.contains("echo"));
    }

    #[tokio::test]
    async fn existing_system_message_suppresses_the_preamble() {
        let (looper, _) = agent(MockBackend::always_text("ok"), Arc::new(AcceptAll), 10);
        let mut history = vec![Message::system("custom system"), Message::user("hi")];
        looper.run(&mut history).await.unwrap();
        assert_eq!(history[0].content, "custom system");
        // no second system message
        assert_eq!(history.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    // ── One tool round ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn tool_round_produces_the_canonical_transcript_shape() {
        let mock = MockBackend::tool_then_text("c1", "echo", json!({"text": "x"}), "You have one file.");
        let (looper, backend) = agent(mock, Arc::new(AcceptAll), 10);
        let mut history = vec![Message::user("list files")];
        let reply = looper.run(&mut history).await.unwrap();

        assert_eq!(reply, "You have one file.");
        // system preamble, user, assistant+tool_calls, tool, assistant
        assert_eq!(history.len(), 5);
        assert_eq!(history[1].role, Role::User);
        assert_eq!(history[2].role, Role::Assistant);
        assert!(history[2].tool_calls.is_some());
        assert_eq!(history[3].role, Role::Tool);
        assert_eq!(history[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(history[4].role, Role::Assistant);
        assert!(history[4].tool_calls.is_none());
        // two model calls used
        assert_eq!(backend.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tool_result_content_is_the_serialized_tool_result() {
        let mock = MockBackend::tool_then_text("c1", "echo", json!({"text": "x"}), "done");
        let (looper, _) = agent(mock, Arc::new(AcceptAll), 10);
        let mut history = vec![Message::user("go")];
        looper.run(&mut history).await.unwrap();

        let parsed: Value = serde_json::from_str(&history[3].content).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["echo"]["text"], "x");
    }

    #[tokio::test]
    async fn multiple_calls_execute_in_wire_order() {
        let response = ChatResponse::with_tool_calls(
            "",
            vec![
                ToolCall::new("a", "echo", json!({"text": "first"})),
                ToolCall::new("b", "echo", json!({"text": "second"})),
            ],
        );
        let mock = MockBackend::new(vec![Ok(response), Ok(ChatResponse::text("fin"))]);
        let (looper, _) = agent(mock, Arc::new(AcceptAll), 10);
        let mut history = vec![Message::user("go")];
        looper.run(&mut history).await.unwrap();

        let tool_messages: Vec<&Message> =
            history.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("a"));
        assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("b"));
    }

    // ── Refusal and unknown tools ─────────────────────────────────────────────

    #[tokio::test]
    async fn refused_destructive_call_feeds_user_rejected_to_the_model() {
        let mock = MockBackend::tool_then_text("c1", "danger", json!({}), "Understood, skipping.");
        let (looper, _) = agent(mock, Arc::new(RefuseAll), 10);
        let mut history = vec![Message::user("delete everything")];
        let reply = looper.run(&mut history).await.unwrap();

        assert_eq!(reply, "Understood, skipping.");
        let tool_msg = history.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.contains("\"error\":\"USER_REJECTED\""));
        assert!(tool_msg.content.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn non_destructive_tools_bypass_the_gate() {
        // RefuseAll gate, but echo does not require confirmation.
        let mock = MockBackend::tool_then_text("c1", "echo", json!({"text": "x"}), "done");
        let (looper, _) = agent(mock, Arc::new(RefuseAll), 10);
        let mut history = vec![Message::user("go")];
        looper.run(&mut history).await.unwrap();

        let tool_msg = history.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.contains("\"success\":true"));
    }

    #[tokio::test]
    async fn unknown_tool_yields_structured_error_result() {
        let mock = MockBackend::tool_then_text("c1", "no_such_tool", json!({}), "sorry");
        let (looper, _) = agent(mock, Arc::new(AcceptAll), 10);
        let mut history = vec![Message::user("go")];
        looper.run(&mut history).await.unwrap();

        let tool_msg = history.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.contains("Tool 'no_such_tool' not found"));
    }

    // ── Iteration cap ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn iteration_cap_appends_terminal_assistant_message() {
        let endless = |i: usize| {
            Ok(ChatResponse::with_tool_calls(
                "",
                vec![ToolCall::new(format!("c{i}"), "echo", json!({}))],
            ))
        };
        let mock = MockBackend::new((0..5).map(endless).collect());
        let (looper, backend) = agent(mock, Arc::new(AcceptAll), 2);
        let mut history = vec![Message::user("loop forever")];
        let reply = looper.run(&mut history).await.unwrap();

        assert!(reply.contains("Iteration limit reached (2"));
        assert_eq!(history.last().unwrap().role, Role::Assistant);
        assert_eq!(backend.requests.lock().unwrap().len(), 2);
        // loop terminated within max_iterations model calls
        assert_eq!(backend.remaining(), 3);
    }

    // ── Errors and cancellation ───────────────────────────────────────────────

    #[tokio::test]
    async fn backend_error_aborts_the_turn_but_keeps_history() {
        let mock = MockBackend::new(vec![Err(agentichat_backend::BackendError::new(
            "no auth",
            BackendErrorKind::AuthError,
        ))]);
        let (looper, _) = agent(mock, Arc::new(AcceptAll), 10);
        let mut history = vec![Message::user("hi")];
        let err = looper.run(&mut history).await.unwrap_err();
        assert!(matches!(err, TurnError::Backend(e) if e.kind == BackendErrorKind::AuthError));
        // preamble + user survive for the next turn
        assert_eq!(history.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn pre_fired_cancellation_stops_before_the_model_call() {
        let mock = MockBackend::always_text("never seen");
        let (looper, backend) = agent(mock, Arc::new(AcceptAll), 10);
        let (tx, mut rx) = oneshot::channel::<()>();
        tx.send(()).unwrap();

        let mut history = vec![Message::user("hi")];
        let err = looper.run_with_cancel(&mut history, &mut rx).await.unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_cancel_sender_counts_as_cancellation() {
        let mock = MockBackend::always_text("never seen");
        let (looper, _) = agent(mock, Arc::new(AcceptAll), 10);
        let (tx, mut rx) = oneshot::channel::<()>();
        drop(tx);

        let mut history = vec![Message::user("hi")];
        let err = looper.run_with_cancel(&mut history, &mut rx).await.unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
    }

    // ── Usage accounting ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn cumulative_usage_is_reset_at_turn_start() {
        let mock = MockBackend::new(vec![
            Ok(ChatResponse::text("first")),
            Ok(ChatResponse::text("second")),
        ]);
        let (looper, backend) = agent(mock, Arc::new(AcceptAll), 10);

        let mut history = vec![Message::user("one")];
        looper.run(&mut history).await.unwrap();
        history.push(Message::user("two"));
        looper.run(&mut history).await.unwrap();

        // Only the second turn's single call remains after the reset.
        assert_eq!(backend.cumulative_usage().api_calls, 1);
    }

    #[tokio::test]
    async fn api_calls_counts_model_calls_within_the_turn() {
        let mock = MockBackend::tool_then_text("c1", "echo", json!({}), "done");
        let (looper, backend) = agent(mock, Arc::new(AcceptAll), 10);
        let mut history = vec![Message::user("go")];
        looper.run(&mut history).await.unwrap();

        let usage = backend.cumulative_usage();
        assert_eq!(usage.api_calls, 2);
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }
}
