// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! User project guidelines: a markdown file (`AGENTICHAT.md`) compiled by
//! the model into a terse system preamble (`consignes.atc`) and injected at
//! the front of the transcript.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::info;

use agentichat_backend::{Backend, Message, Role};

pub const GUIDELINES_HEADER: &str = "[User Project Guidelines]";
pub const GUIDELINES_FOOTER: &str = "[End of Guidelines]";

const SOURCE_FILENAME: &str = "AGENTICHAT.md";
const COMPILED_FILENAME: &str = "consignes.atc";

pub struct GuidelinesManager {
    source_file: PathBuf,
    compiled_file: PathBuf,
}

impl GuidelinesManager {
    /// `workspace_dir` holds the markdown source; `data_dir` receives the
    /// compiled form.
    pub fn new(workspace_dir: &Path, data_dir: &Path) -> Self {
        Self {
            source_file: workspace_dir.join(SOURCE_FILENAME),
            compiled_file: data_dir.join(COMPILED_FILENAME),
        }
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn compiled_file(&self) -> &Path {
        &self.compiled_file
    }

    pub fn has_source(&self) -> bool {
        self.source_file.exists()
    }

    pub fn has_compiled(&self) -> bool {
        self.compiled_file.exists()
    }

    /// Compilation is needed when the source exists and the compiled form is
    /// absent or older than it.
    pub fn needs_compile(&self) -> bool {
        if !self.has_source() {
            return false;
        }
        if !self.has_compiled() {
            return true;
        }
        let mtime = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
        match (mtime(&self.source_file), mtime(&self.compiled_file)) {
            (Some(src), Some(compiled)) => src > compiled,
            _ => true,
        }
    }

    pub fn read_source(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(&self.source_file)
            .with_context(|| format!("reading {}", self.source_file.display()))
    }

    pub fn read_compiled(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(&self.compiled_file)
            .with_context(|| format!("reading {}", self.compiled_file.display()))
    }

    pub fn save_compiled(&self, content: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.compiled_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&self.compiled_file, content)
            .with_context(|| format!("writing {}", self.compiled_file.display()))?;
        info!(path = %self.compiled_file.display(), "compiled guidelines saved");
        Ok(())
    }

    /// Ask the model to rewrite the source into a structured, concise,
    /// English, LLM-oriented format, then persist the result.
    pub async fn compile(&self, backend: &dyn Backend) -> anyhow::Result<String> {
        let source = self.read_source()?;
        let prompt = format!(
            "You are a technical assistant optimizing user guidelines for LLM consumption.\n\n\
             The user has written project guidelines in a markdown file. Your task is to:\n\
             1. Extract the key directives and rules\n\
             2. Reformat them in a concise, structured format optimized for LLM understanding\n\
             3. Use English for better comprehension\n\
             4. Keep technical terms and specific instructions\n\n\
             Output format:\n\
             - Start with \"# PROJECT GUIDELINES\"\n\
             - Use clear sections (## CODING STYLE, ## DOCUMENTATION, ## ARCHITECTURE, ...)\n\
             - Use bullet points for rules\n\
             - Be concise but precise\n\
             - Include file references when mentioned\n\n\
             Here is the source content:\n\n---\n{source}\n---\n\n\
             Now generate the optimized guidelines (in English, structured, concise):"
        );

        info!("compiling guidelines with the model");
        let response = backend
            .chat(&[Message::user(prompt)], &[])
            .await
            .context("guideline compilation request failed")?;
        let compiled = response.content.trim().to_string();
        if compiled.is_empty() {
            bail!("model returned empty guidelines");
        }

        self.save_compiled(&compiled)?;
        Ok(compiled)
    }

    /// The system message carrying the compiled guidelines, or `None` when
    /// nothing is compiled yet.
    pub fn system_message(&self) -> Option<Message> {
        let compiled = self.read_compiled().ok()?;
        Some(Message::system(format!(
            "{GUIDELINES_HEADER}\n\n{compiled}\n\n{GUIDELINES_FOOTER}"
        )))
    }

    /// Prepend the guidelines system message, removing any previous one
    /// first (identified by its delimiter).  Idempotent.
    pub fn inject(&self, messages: &mut Vec<Message>) {
        let Some(fresh) = self.system_message() else {
            return;
        };
        messages.retain(|m| {
            !(m.role == Role::System && m.content.starts_with(GUIDELINES_HEADER))
        });
        messages.insert(0, fresh);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
