// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Typed resume file: the complete ordered transcript, serialized with a
//! format version.  Loading refuses an incompatible version instead of
//! silently discarding or misreading the data.

use std::path::Path;

use serde::{Deserialize, Serialize};

use agentichat_backend::Message;

use crate::StoreError;

pub const TRANSCRIPT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptFile {
    pub version: u32,
    pub backend: String,
    pub model: String,
    pub messages: Vec<Message>,
}

/// Write the transcript for resume across runs.
pub fn save_transcript(
    path: &Path,
    backend: &str,
    model: &str,
    messages: &[Message],
) -> Result<(), StoreError> {
    let file = TranscriptFile {
        version: TRANSCRIPT_VERSION,
        backend: backend.to_string(),
        model: model.to_string(),
        messages: messages.to_vec(),
    };
    let text = serde_json::to_string_pretty(&file)?;
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::write(path, text)
        .map_err(|e| StoreError::Invalid(format!("cannot write {}: {e}", path.display())))?;
    Ok(())
}

/// Load a previously saved transcript, refusing version mismatches.
pub fn load_transcript(path: &Path) -> Result<TranscriptFile, StoreError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Invalid(format!("cannot read {}: {e}", path.display())))?;
    let file: TranscriptFile = serde_json::from_str(&text)?;
    if file.version != TRANSCRIPT_VERSION {
        return Err(StoreError::Invalid(format!(
            "incompatible transcript version {} (expected {TRANSCRIPT_VERSION})",
            file.version
        )));
    }
    Ok(file)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agentichat_backend::ToolCall;
    use serde_json::json;

    #[test]
    fn transcript_round_trips_including_tool_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.json");

        let messages = vec![
            Message::user("hi"),
            Message::assistant_with_calls(
                "",
                vec![ToolCall::new("c1", "read_file", json!({"path": "a"}))],
            ),
            Message::tool_result("c1", "{\"success\":true}"),
            Message::assistant("done"),
        ];
        save_transcript(&path, "ollama", "qwen2.5", &messages).unwrap();

        let loaded = load_transcript(&path).unwrap();
        assert_eq!(loaded.version, TRANSCRIPT_VERSION);
        assert_eq!(loaded.backend, "ollama");
        assert_eq!(loaded.model, "qwen2.5");
        assert_eq!(loaded.messages, messages);
        // arguments stay nested JSON on disk
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"path\": \"a\""));
    }

    #[test]
    fn version_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "backend": "b", "model": "m", "messages": []}"#,
        )
        .unwrap();
        let err = load_transcript(&path).unwrap_err();
        assert!(err.to_string().contains("incompatible transcript version"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_transcript(&dir.path().join("none.json")).is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{").unwrap();
        assert!(load_transcript(&path).is_err());
    }
}
