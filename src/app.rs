// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! The interactive REPL: line input, slash commands, turn orchestration,
//! persistence, and the compression/guidelines plumbing around the core.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::oneshot;
use tracing::{info, warn};

use agentichat_backend::{estimate_messages_tokens, Backend, BackendErrorKind, Message};
use agentichat_config::{Config, GuidelinesLoadMode};
use agentichat_core::{
    should_auto_compress, AgentLoop, Compressor, GuidelinesManager, ModeCell, TurnError,
};
use agentichat_store::{save_transcript, ModelMetadataStore, SessionStore};

use crate::spinner::Spinner;

pub struct App {
    config: Config,
    backend: Arc<dyn Backend>,
    backend_name: String,
    agent: AgentLoop,
    compressor: Compressor,
    guidelines: GuidelinesManager,
    store: SessionStore,
    metadata: ModelMetadataStore,
    session_id: String,
    mode: ModeCell,
    spinner: Spinner,
    history: Vec<Message>,
    /// Messages [0..persisted) are already in the database.
    persisted: usize,
    data_dir: PathBuf,
    context_max_tokens: Option<usize>,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        backend_name: String,
        backend: Arc<dyn Backend>,
        agent: AgentLoop,
        guidelines: GuidelinesManager,
        store: SessionStore,
        metadata: ModelMetadataStore,
        session_id: String,
        mode: ModeCell,
        spinner: Spinner,
        history: Vec<Message>,
        data_dir: PathBuf,
        context_max_tokens: Option<usize>,
    ) -> Self {
        let compressor = Compressor::new(Arc::clone(&backend));
        let persisted = history.len();
        Self {
            config,
            backend,
            backend_name,
            agent,
            compressor,
            guidelines,
            store,
            metadata,
            session_id,
            mode,
            spinner,
            history,
            persisted,
            data_dir,
            context_max_tokens,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!(
            "agentichat — {} / {} (type /help for commands)",
            self.backend_name,
            self.backend.model()
        );
        if !self.backend.health_check().await {
            println!("warning: backend is not reachable; requests will fail until it is");
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.startup_guidelines(&mut lines).await;

        loop {
            print!("you> ");
            let _ = std::io::stdout().flush();
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            self.append_history_file(&line);

            if let Some(command) = line.strip_prefix('/') {
                if !self.handle_command(command).await {
                    break;
                }
                continue;
            }
            self.run_turn(&line).await;
        }

        self.spinner.shutdown();
        Ok(())
    }

    // ── Turn orchestration ────────────────────────────────────────────────────

    async fn run_turn(&mut self, input: &str) {
        self.spinner.start("thinking");
        let status_backend = Arc::clone(&self.backend);
        self.spinner.set_status_fn(Some(Box::new(move || {
            status_backend.retry_info().map(|r| {
                let status = r
                    .status_code
                    .map(|s| format!(" (HTTP {s})"))
                    .unwrap_or_default();
                format!(
                    "retry {}/{} in {}s{status}",
                    r.attempt,
                    r.max_retries,
                    r.delay.as_secs()
                )
            })
        })));

        // Ctrl-C cancels the turn cooperatively; the transcript keeps
        // whatever consistent state was reached.
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = cancel_tx.send(());
            }
        });

        self.history.push(Message::user(input));
        let result = self
            .agent
            .run_with_cancel(&mut self.history, &mut cancel_rx)
            .await;
        interrupt.abort();
        self.spinner.set_status_fn(None);
        self.spinner.stop();

        match result {
            Ok(reply) => {
                println!("\n{reply}\n");
                self.print_usage();
                self.warn_if_context_nearly_full();
            }
            Err(TurnError::Cancelled) => {
                println!("\n(turn cancelled)");
            }
            Err(TurnError::Backend(e)) => self.report_backend_error(&e),
        }

        self.persist_new_messages();
        self.save_resume_file();
        if should_auto_compress(self.history.len(), &self.config.compression) {
            println!("(auto-compressing conversation history)");
            self.compress_now().await;
        }
    }

    /// Streaming chat without tools — the pure chat path.  Tool-driven
    /// turns always use the non-streaming loop.
    async fn stream_plain(&mut self, input: &str) {
        self.history.push(Message::user(input));
        let mut stream = match self.backend.chat_stream(&self.history).await {
            Ok(s) => s,
            Err(e) => {
                self.report_backend_error(&e);
                return;
            }
        };

        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                    full.push_str(&text);
                }
                Err(e) => {
                    println!("\nstream error: {e}");
                    break;
                }
            }
        }
        println!();
        self.history.push(Message::assistant(&full));
        self.persist_new_messages();
        self.save_resume_file();
    }

    fn report_backend_error(&mut self, error: &agentichat_backend::BackendError) {
        // The one place configuration is learned from error prose: a server
        // that only does single tool-calls gets its cap persisted.
        let model = self.backend.model();
        if self.metadata.detect_and_save_constraint(&model, &error.message) {
            self.backend.set_max_parallel_tools(Some(1));
            println!(
                "\nThis model only supports single tool calls; the constraint was \
                 saved for '{model}'. Please retry your request."
            );
            return;
        }

        warn!(kind = ?error.kind, "turn aborted by backend error");
        match error.kind {
            BackendErrorKind::AuthError => {
                println!("\nAuthentication failed: {error}. Check the configured api_key.")
            }
            BackendErrorKind::ModelNotFound => {
                println!("\nModel '{model}' not found on the backend: {error}")
            }
            BackendErrorKind::ContextTooLong => {
                println!("\nThe conversation no longer fits the model context: {error}");
                println!("Use /compress to shrink the history, then retry.");
            }
            BackendErrorKind::RateLimit => {
                println!("\nRate limited after retries: {error}. Wait a moment and retry.")
            }
            _ => println!("\nBackend error: {error}"),
        }
        // The conversation stays usable on the same transcript.
    }

    fn print_usage(&self) {
        let usage = self.backend.cumulative_usage();
        if usage.api_calls > 0 {
            println!(
                "[{} model call(s), {} prompt + {} completion = {} tokens]",
                usage.api_calls,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }
    }

    fn warn_if_context_nearly_full(&self) {
        let Some(ctx) = self.context_max_tokens else {
            return;
        };
        let estimate = estimate_messages_tokens(&self.history);
        if estimate as f32 >= self.config.compression.warning_threshold * ctx as f32 {
            println!(
                "warning: the conversation is near the context limit \
                 (~{estimate}/{ctx} tokens); consider /compress"
            );
        }
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    fn persist_new_messages(&mut self) {
        for message in &self.history[self.persisted..] {
            let tokens = message.approx_tokens() as u64;
            if let Err(e) = self.store.save_message(&self.session_id, message, Some(tokens)) {
                warn!(error = %e, "cannot persist message");
            }
        }
        self.persisted = self.history.len();
    }

    fn save_resume_file(&self) {
        let path = self.data_dir.join("conversation.json");
        if let Err(e) = save_transcript(
            &path,
            &self.backend_name,
            &self.backend.model(),
            &self.history,
        ) {
            warn!(error = %e, "cannot save resume transcript");
        }
    }

    fn append_history_file(&self, line: &str) {
        let path = self.data_dir.join("history.txt");
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{line}");
        }
    }

    // ── Compression ───────────────────────────────────────────────────────────

    async fn compress_now(&mut self) {
        self.spinner.start("compressing");
        let keep = self.config.compression.auto_keep;
        let result = self.compressor.compress(&self.history, keep).await;
        self.spinner.stop();

        match result {
            Ok(outcome) => {
                self.history = outcome.messages;
                // The summary replaced the prefix; guidelines ride on top.
                self.guidelines.inject(&mut self.history);
                if let Err(e) = self.store.save_compression(
                    &self.session_id,
                    outcome.record.original_count,
                    outcome.record.compressed_count,
                    &outcome.record.summary,
                ) {
                    warn!(error = %e, "cannot persist compression record");
                }
                // The database keeps the full appended history; only the
                // fresh summary message is a new row.
                if let Some(summary) = self
                    .history
                    .iter()
                    .find(|m| m.content.starts_with(agentichat_core::SUMMARY_HEADER))
                {
                    let _ = self.store.save_message(&self.session_id, summary, None);
                }
                self.persisted = self.history.len();
                self.save_resume_file();
                println!(
                    "compressed {} messages down to {}",
                    outcome.record.original_count, outcome.record.compressed_count
                );
            }
            Err(e) => println!("compression failed: {e}"),
        }
    }

    // ── Guidelines ────────────────────────────────────────────────────────────

    async fn startup_guidelines(&mut self, lines: &mut Lines<BufReader<Stdin>>) {
        match self.config.guidelines.load_mode {
            GuidelinesLoadMode::Off => {}
            GuidelinesLoadMode::Auto => self.load_guidelines().await,
            GuidelinesLoadMode::Confirm => {
                if !self.guidelines.has_source() {
                    return;
                }
                print!("Project guidelines found (AGENTICHAT.md). Load them? [y/N] ");
                let _ = std::io::stdout().flush();
                if let Ok(Some(answer)) = lines.next_line().await {
                    if matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                        self.load_guidelines().await;
                    }
                }
            }
        }
    }

    async fn load_guidelines(&mut self) {
        if !self.guidelines.has_source() {
            println!("no AGENTICHAT.md in the workspace");
            return;
        }
        if self.guidelines.needs_compile() {
            self.spinner.start("compiling guidelines");
            let result = self.guidelines.compile(self.backend.as_ref()).await;
            self.spinner.stop();
            if let Err(e) = result {
                println!("guideline compilation failed: {e}");
                return;
            }
        }
        self.guidelines.inject(&mut self.history);
        info!("guidelines injected");
        println!("guidelines loaded");
    }

    // ── Slash commands ────────────────────────────────────────────────────────

    /// Returns `false` when the REPL should exit.
    async fn handle_command(&mut self, command: &str) -> bool {
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        match name {
            "quit" | "exit" | "q" => return false,
            "help" => self.print_help(),
            "mode" => {
                let mode = self.mode.cycle();
                println!("confirmation mode: {}", mode.label());
            }
            "compress" => self.compress_now().await,
            "reset" => {
                self.history.clear();
                self.persisted = 0;
                self.mode.reset();
                if self.config.guidelines.load_mode != GuidelinesLoadMode::Off {
                    self.guidelines.inject(&mut self.history);
                    self.persisted = self.history.len();
                }
                println!("conversation reset (confirmation mode back to Ask)");
            }
            "stats" => self.print_stats(),
            "sessions" => match self.store.list_sessions(10) {
                Ok(sessions) => {
                    for s in sessions {
                        println!(
                            "{}  {}/{}  {} message(s)",
                            s.id, s.backend, s.model, s.message_count
                        );
                    }
                }
                Err(e) => println!("cannot list sessions: {e}"),
            },
            "models" => match self.backend.list_models().await {
                Ok(models) => {
                    for m in models {
                        println!("{m}");
                    }
                }
                Err(e) => println!("cannot list models: {e}"),
            },
            "guidelines" => self.load_guidelines().await,
            "stream" => {
                if rest.trim().is_empty() {
                    println!("usage: /stream <message>");
                } else {
                    self.stream_plain(rest.trim()).await;
                }
            }
            other => println!("unknown command '/{other}' (see /help)"),
        }
        true
    }

    fn print_help(&self) {
        println!(
            "commands:\n\
             /help              this help\n\
             /mode              cycle confirmation mode (Ask → Auto → Force)\n\
             /compress          summarize older history to free context\n\
             /reset             wipe the conversation (and reset the mode)\n\
             /stats             session statistics\n\
             /sessions          recent sessions\n\
             /models            models available on the backend\n\
             /guidelines        (re)load project guidelines\n\
             /stream <message>  plain streamed chat without tools\n\
             /quit              exit"
        );
    }

    fn print_stats(&self) {
        match self.store.session_stats(&self.session_id) {
            Ok(Some(stats)) => {
                println!(
                    "session {}\n  backend: {}/{}\n  messages: {} ({} user, {} assistant)\n  \
                     tokens: {}\n  compressions: {}",
                    stats.session_id,
                    stats.backend,
                    stats.model,
                    stats.message_count,
                    stats.user_messages,
                    stats.assistant_messages,
                    stats.total_tokens,
                    stats.compression_count
                );
            }
            Ok(None) => println!("no stats for this session yet"),
            Err(e) => println!("cannot read stats: {e}"),
        }
    }
}
