// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "agentichat",
    version,
    about = "Interactive terminal chat with an LLM and sandboxed tool calling"
)]
pub struct Cli {
    /// Explicit configuration file (overrides the search path)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Backend name from the configuration (default: default_backend)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Model override for the selected backend
    #[arg(short, long)]
    pub model: Option<String>,

    /// Workspace root (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Resume the transcript saved by the previous run
    #[arg(long)]
    pub resume: bool,

    /// Verbose logging to stderr in addition to the log file
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List recent sessions from the local database
    Sessions {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show aggregate statistics for a session
    Stats {
        /// Session id (default: most recent)
        session: Option<String>,
    },
    /// Delete a session and its messages
    DeleteSession { session: String },
    /// Compile AGENTICHAT.md into the optimized guidelines preamble
    CompileGuidelines,
    /// List the models available on the selected backend
    ListModels,
    /// Print the effective merged configuration
    ShowConfig,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_invocation() {
        let cli = Cli::parse_from(["agentichat"]);
        assert!(cli.command.is_none());
        assert!(!cli.resume);
    }

    #[test]
    fn parses_backend_and_model_overrides() {
        let cli = Cli::parse_from(["agentichat", "-b", "hosted", "-m", "big-32b"]);
        assert_eq!(cli.backend.as_deref(), Some("hosted"));
        assert_eq!(cli.model.as_deref(), Some("big-32b"));
    }

    #[test]
    fn parses_sessions_subcommand_with_limit() {
        let cli = Cli::parse_from(["agentichat", "sessions", "--limit", "3"]);
        match cli.command {
            Some(Commands::Sessions { limit }) => assert_eq!(limit, 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_stats_with_optional_session() {
        let cli = Cli::parse_from(["agentichat", "stats"]);
        assert!(matches!(cli.command, Some(Commands::Stats { session: None })));

        let cli = Cli::parse_from(["agentichat", "stats", "abc"]);
        assert!(matches!(cli.command, Some(Commands::Stats { session: Some(s) }) if s == "abc"));
    }
}
