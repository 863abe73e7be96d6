// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! LLM-driven history compression: an arbitrary prefix of the transcript is
//! replaced by a single system-role summary message obtained from the model.

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use agentichat_backend::{Backend, Message, Role};
use agentichat_config::CompressionConfig;

pub const SUMMARY_HEADER: &str = "[Summary of prior conversation]";
pub const SUMMARY_FOOTER: &str = "[End of summary]";

const SUMMARY_PROMPT: &str = "Summarize the following conversation concisely but completely. \
     Cover the key points discussed, the decisions made, and any context \
     needed to continue the conversation. The summary will replace the \
     original history.";

/// Minimum transcript length worth compressing.
const MIN_MESSAGES: usize = 4;

/// Result of one compression pass.
#[derive(Debug)]
pub struct CompressionOutcome {
    /// The new transcript: summary message followed by the kept tail.
    pub messages: Vec<Message>,
    pub record: CompressionRecord,
}

/// Durable compression event for the session store.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionRecord {
    pub original_count: usize,
    pub compressed_count: usize,
    pub summary: String,
}

pub struct Compressor {
    backend: Arc<dyn Backend>,
}

impl Compressor {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Summarize everything except the last `keep` messages and splice the
    /// summary back in as a leading system message.
    pub async fn compress(
        &self,
        messages: &[Message],
        keep: usize,
    ) -> anyhow::Result<CompressionOutcome> {
        if messages.len() < MIN_MESSAGES {
            bail!(
                "transcript too short to compress ({} messages, minimum {MIN_MESSAGES})",
                messages.len()
            );
        }

        let keep = keep.min(messages.len());
        let split = messages.len() - keep;
        let prefix = &messages[..split];
        let tail = &messages[split..];

        let rendered = render_history(prefix);
        let request = Message::user(format!("{SUMMARY_PROMPT}\n\n---\n\n{rendered}"));

        // One-shot call, no tools: compression never triggers the loop.
        let response = self
            .backend
            .chat(&[request], &[])
            .await
            .context("summary request failed")?;
        let summary = response.content.trim().to_string();
        if summary.is_empty() {
            bail!("model returned an empty summary");
        }

        let summary_message =
            Message::system(format!("{SUMMARY_HEADER}\n\n{summary}\n\n{SUMMARY_FOOTER}"));

        let mut compressed = Vec::with_capacity(1 + tail.len());
        compressed.push(summary_message);
        compressed.extend(tail.iter().cloned());

        info!(
            original = messages.len(),
            compressed = compressed.len(),
            "compressed conversation history"
        );

        Ok(CompressionOutcome {
            record: CompressionRecord {
                original_count: messages.len(),
                compressed_count: compressed.len(),
                summary,
            },
            messages: compressed,
        })
    }
}

/// Whether automatic compression should fire for a transcript of `len`
/// messages under the given configuration.
pub fn should_auto_compress(len: usize, config: &CompressionConfig) -> bool {
    config.auto_enabled && len >= config.auto_threshold && len >= MIN_MESSAGES
}

/// Render messages as plain `Role: content` lines for the summary prompt.
fn render_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
                Role::Tool => "Tool",
            };
            format!("{role}: {}\n", m.content)
        })
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
