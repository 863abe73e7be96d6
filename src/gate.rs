// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Terminal confirmation gate: single-keypress authorization of destructive
//! tool calls, interleaved safely with the live spinner.

use async_trait::async_trait;
use crossterm::event::{Event, KeyCode, KeyModifiers};
use serde_json::Value;

use agentichat_core::{ConfirmationGate, ConfirmationMode, ModeCell};

use crate::spinner::Spinner;

pub struct TerminalGate {
    mode: ModeCell,
    spinner: Spinner,
}

impl TerminalGate {
    pub fn new(mode: ModeCell, spinner: Spinner) -> Self {
        Self { mode, spinner }
    }
}

#[async_trait]
impl ConfirmationGate for TerminalGate {
    async fn confirm(&self, tool_name: &str, arguments: &Value) -> bool {
        // Auto and Force accept without touching the terminal.
        if self.mode.get().accepts_silently() {
            return true;
        }

        // Borrow the terminal: the spinner stays silent until the answer.
        self.spinner.pause();

        let tool = tool_name.to_string();
        let args = arguments.clone();
        let mode = self.mode.clone();
        let accepted = tokio::task::spawn_blocking(move || prompt_user(&tool, &args, &mode))
            .await
            .unwrap_or(false);

        self.spinner.resume();
        accepted
    }
}

/// Blocking prompt loop: renders the request and reads single keypresses in
/// raw mode until the user answers.
fn prompt_user(tool_name: &str, arguments: &Value, mode: &ModeCell) -> bool {
    println!();
    println!("=== CONFIRMATION REQUIRED ===");
    println!("{}", render_request(tool_name, arguments));
    println!("[Y] yes   [A] yes to all   [N] no   [?] help");

    loop {
        let key = match read_key() {
            Some(k) => k,
            // EOF or terminal error: refuse, never hang.
            None => return false,
        };
        match key {
            Answer::Yes => {
                println!("accepted");
                return true;
            }
            Answer::All => {
                mode.set(ConfirmationMode::Auto);
                println!("accepted — AUTO mode enabled for this session");
                return true;
            }
            Answer::No => {
                println!("refused");
                return false;
            }
            Answer::Help => {
                println!("{HELP_TEXT}");
            }
            Answer::Other => {
                println!("invalid answer; press Y, A, N, or ? for help");
            }
        }
    }
}

const HELP_TEXT: &str = "\
Y / Enter  accept this operation
A          accept this one AND all following ones (switches to AUTO mode)
N / Esc    refuse; the model receives a structured rejection and may
           explain or propose an alternative
?          show this help";

enum Answer {
    Yes,
    All,
    No,
    Help,
    Other,
}

/// Read one keypress in raw mode.  Returns `None` on error or Ctrl-C/Ctrl-D.
fn read_key() -> Option<Answer> {
    crossterm::terminal::enable_raw_mode().ok()?;
    let result = loop {
        match crossterm::event::read() {
            Ok(Event::Key(key)) => {
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
                {
                    break None;
                }
                break Some(match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Answer::Yes,
                    KeyCode::Char('a') | KeyCode::Char('A') => Answer::All,
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Answer::No,
                    KeyCode::Char('?') => Answer::Help,
                    _ => Answer::Other,
                });
            }
            Ok(_) => continue,
            Err(_) => break None,
        }
    };
    let _ = crossterm::terminal::disable_raw_mode();
    result
}

/// Render the confirmation request, tool-aware for the common destructive
/// operations and generic JSON otherwise.
pub fn render_request(tool_name: &str, arguments: &Value) -> String {
    match tool_name {
        "write_file" => {
            let path = arguments["path"].as_str().unwrap_or("?");
            let content = arguments["content"].as_str().unwrap_or("");
            let preview: String = content.chars().take(200).collect();
            let ellipsis = if content.chars().count() > 200 { "..." } else { "" };
            format!("Write file: {path}\n---\n{preview}{ellipsis}\n---")
        }
        "delete_file" => {
            format!("Delete file: {}", arguments["path"].as_str().unwrap_or("?"))
        }
        "delete_directory" => {
            let recursive = arguments["recursive"].as_bool().unwrap_or(false);
            format!(
                "Delete directory{}: {}",
                if recursive { " (recursive)" } else { "" },
                arguments["path"].as_str().unwrap_or("?")
            )
        }
        "shell_exec" => {
            let command = arguments["command"].as_str().unwrap_or("?");
            let cwd = arguments["cwd"].as_str().unwrap_or(".");
            format!("Run command: $ {command}\n(in {cwd})")
        }
        other => format!(
            "Tool: {other}\n{}",
            serde_json::to_string_pretty(arguments).unwrap_or_else(|_| "{}".into())
        ),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_file_request_previews_content() {
        let text = render_request(
            "write_file",
            &json!({"path": "a.txt", "content": "hello world"}),
        );
        assert!(text.contains("Write file: a.txt"));
        assert!(text.contains("hello world"));
    }

    #[test]
    fn write_file_preview_is_truncated() {
        let long = "x".repeat(500);
        let text = render_request("write_file", &json!({"path": "a", "content": long}));
        assert!(text.contains("..."));
        assert!(text.len() < 400);
    }

    #[test]
    fn shell_request_shows_command_and_cwd() {
        let text = render_request(
            "shell_exec",
            &json!({"command": "rm -rf build", "cwd": "sub"}),
        );
        assert!(text.contains("$ rm -rf build"));
        assert!(text.contains("(in sub)"));
    }

    #[test]
    fn delete_directory_marks_recursive() {
        let text = render_request(
            "delete_directory",
            &json!({"path": "old", "recursive": true}),
        );
        assert!(text.contains("(recursive)"));
        assert!(text.contains("old"));
    }

    #[test]
    fn unknown_tool_falls_back_to_json_dump() {
        let text = render_request("custom_tool", &json!({"a": 1}));
        assert!(text.contains("custom_tool"));
        assert!(text.contains("\"a\": 1"));
    }

    #[tokio::test]
    async fn auto_mode_accepts_without_prompting() {
        let mode = ModeCell::new(ConfirmationMode::Auto);
        let gate = TerminalGate::new(mode, Spinner::new());
        assert!(gate.confirm("delete_file", &json!({"path": "x"})).await);
    }

    #[tokio::test]
    async fn force_mode_accepts_without_prompting() {
        let mode = ModeCell::new(ConfirmationMode::Force);
        let gate = TerminalGate::new(mode.clone(), Spinner::new());
        assert!(gate.confirm("shell_exec", &json!({"command": "ls"})).await);
        assert_eq!(mode.get(), ConfirmationMode::Force);
    }
}
