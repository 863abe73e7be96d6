// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

/// User-selectable strictness of the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmationMode {
    /// Prompt on every destructive tool call.
    #[default]
    Ask,
    /// Accept without prompting; entered by key binding or by answering "A".
    Auto,
    /// Accept unconditionally; entered only by key binding.
    Force,
}

impl ConfirmationMode {
    /// Cyclic transition: Ask → Auto → Force → Ask.
    pub fn cycled(self) -> Self {
        match self {
            Self::Ask => Self::Auto,
            Self::Auto => Self::Force,
            Self::Force => Self::Ask,
        }
    }

    /// Status-bar label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ask => "Ask",
            Self::Auto => "Auto",
            Self::Force => "Force",
        }
    }

    /// Whether this mode accepts destructive calls without prompting.
    pub fn accepts_silently(self) -> bool {
        matches!(self, Self::Auto | Self::Force)
    }
}

/// Shared confirmation mode.  The mode persists for the process lifetime;
/// the gate and the key-binding handler mutate the same cell so an "A"
/// answer is immediately visible everywhere.
#[derive(Debug, Clone, Default)]
pub struct ModeCell(Arc<Mutex<ConfirmationMode>>);

impl ModeCell {
    pub fn new(mode: ConfirmationMode) -> Self {
        Self(Arc::new(Mutex::new(mode)))
    }

    pub fn get(&self) -> ConfirmationMode {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, mode: ConfirmationMode) {
        *self.0.lock().unwrap() = mode;
    }

    /// Advance to the next mode and return it.
    pub fn cycle(&self) -> ConfirmationMode {
        let mut guard = self.0.lock().unwrap();
        *guard = guard.cycled();
        *guard
    }

    /// Return to Ask (e.g. on conversation wipe).
    pub fn reset(&self) {
        self.set(ConfirmationMode::Ask);
    }
}

/// Authorization hook consulted by the agentic loop before every destructive
/// tool call.  The terminal implementation prompts the user; test and
/// headless variants answer unconditionally.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// `true` authorizes the call; `false` produces a USER_REJECTED result
    /// that the model gets to see.
    async fn confirm(&self, tool_name: &str, arguments: &Value) -> bool;
}

/// Gate that accepts everything (headless runs and tests).
pub struct AcceptAll;

#[async_trait]
impl ConfirmationGate for AcceptAll {
    async fn confirm(&self, _tool_name: &str, _arguments: &Value) -> bool {
        true
    }
}

/// Gate that refuses everything (tests).
pub struct RefuseAll;

#[async_trait]
impl ConfirmationGate for RefuseAll {
    async fn confirm(&self, _tool_name: &str, _arguments: &Value) -> bool {
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
