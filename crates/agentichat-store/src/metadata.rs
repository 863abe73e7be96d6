// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Persisted per-model constraints discovered at runtime.
//!
//! Some servers reject parallel tool calls with an error instead of
//! advertising the limit.  When that happens the constraint is saved here
//! so the user never has to configure it by hand.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModelEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_parallel_tools: Option<usize>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

pub struct ModelMetadataStore {
    path: PathBuf,
    entries: HashMap<String, ModelEntry>,
}

impl ModelMetadataStore {
    /// Load from `<data_dir>/model_metadata.json`; a missing or corrupt
    /// file starts empty.
    pub fn load(data_dir: &std::path::Path) -> Self {
        let path = data_dir.join("model_metadata.json");
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    fn save(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&self.entries) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.path, text) {
                    warn!(path = %self.path.display(), error = %e, "cannot save model metadata");
                }
            }
            Err(e) => warn!(error = %e, "cannot serialize model metadata"),
        }
    }

    pub fn max_parallel_tools(&self, model: &str) -> Option<usize> {
        self.entries.get(model).and_then(|e| e.max_parallel_tools)
    }

    pub fn set_max_parallel_tools(&mut self, model: &str, limit: usize) {
        self.entries.entry(model.to_string()).or_default().max_parallel_tools = Some(limit);
        self.save();
        info!(model, limit, "saved max_parallel_tools constraint");
    }

    /// Inspect an API error message for a known constraint and persist it.
    /// Returns `true` when something was learned.  This is the single place
    /// where configuration is inferred from error prose.
    pub fn detect_and_save_constraint(&mut self, model: &str, error_message: &str) -> bool {
        if error_message
            .to_lowercase()
            .contains("only supports single tool-calls")
        {
            warn!(model, "server reports single tool-call limit; saving constraint");
            self.set_max_parallel_tools(model, 1);
            return true;
        }
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
