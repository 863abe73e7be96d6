// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::sandbox::Sandbox;
use crate::tool::{arg_str, arg_u64, Tool, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Run a shell command inside the workspace.  Destructive: gated behind
/// confirmation.
pub struct ShellExecTool {
    sandbox: Arc<Sandbox>,
}

impl ShellExecTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and capture stdout, stderr, and the exit \
         code. Use for git, build tools, tests, and other programs. The \
         process is killed when the timeout expires. Prefer non-interactive \
         commands; there is no TTY."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command line to execute"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory relative to the workspace (default: workspace root)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 30)",
                    "default": 30
                }
            },
            "required": ["command"]
        })
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value) -> ToolResult {
        let Some(command) = arg_str(args, "command") else {
            return ToolResult::err("missing 'command'");
        };
        let timeout = arg_u64(args, "timeout", DEFAULT_TIMEOUT_SECS);

        if !self.sandbox.command_allowed(command) {
            return ToolResult::err(format!(
                "Command not permitted by the sandbox allow-list: {command}"
            ));
        }

        let workdir = match arg_str(args, "cwd") {
            Some(cwd) => {
                let dir = match self.sandbox.validate(cwd) {
                    Ok(p) => p,
                    Err(e) => return ToolResult::err(e.to_string()),
                };
                if !dir.is_dir() {
                    return ToolResult::err(format!("'{cwd}' is not a directory"));
                }
                dir
            }
            None => self.sandbox.root().to_path_buf(),
        };

        debug!(command, workdir = %workdir.display(), timeout, "shell_exec tool");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.current_dir(&workdir);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // No controlling terminal for the child: stdin from /dev/null, and on
        // unix a fresh session via setsid() so the subprocess cannot reach
        // /dev/tty and corrupt the spinner line with escape sequences.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let result = tokio::time::timeout(Duration::from_secs(timeout), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let returncode = output.status.code().unwrap_or(-1);
                let fields = json!({
                    "command": command,
                    "returncode": returncode,
                    "stdout": stdout,
                    "stderr": stderr,
                });
                if returncode == 0 {
                    ToolResult::ok(fields)
                } else {
                    ToolResult::fail(fields)
                }
            }
            Ok(Err(e)) => ToolResult::fail(json!({
                "command": command,
                "error": format!("spawn error: {e}"),
            })),
            Err(_) => ToolResult::fail(json!({
                "command": command,
                "error": format!("Timeout after {timeout}s"),
            })),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
