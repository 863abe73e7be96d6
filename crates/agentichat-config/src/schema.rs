// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_backend_name() -> String {
    "ollama".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_file_size() -> u64 {
    1_000_000
}
fn default_max_iterations() -> usize {
    10
}
fn default_auto_threshold() -> usize {
    20
}
fn default_auto_keep() -> usize {
    5
}
fn default_warning_threshold() -> f32 {
    0.75
}

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` falls back to `bool::default()` (`false`),
/// so fields that should be enabled unless explicitly disabled need a named
/// function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the backend used when none is selected on the command line.
    /// Must be a key of `backends` whenever `backends` is non-empty.
    #[serde(default = "default_backend_name")]
    pub default_backend: String,
    /// Named backend endpoint configurations.
    ///
    /// ```yaml
    /// backends:
    ///   ollama:
    ///     type: local-runtime
    ///     url: http://localhost:11434
    ///     model: qwen2.5
    ///   hosted:
    ///     type: openai-compat
    ///     url: https://llm.example.org
    ///     model: large-32b
    ///     api_key: YOUR_KEY
    /// ```
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub confirmations: ConfirmationConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub guidelines: GuidelinesConfig,
    /// Upper bound on model calls per user turn in the agentic loop.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Override for the per-project data directory.
    /// Defaults to `<workspace>/.agentichat` when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_backend: default_backend_name(),
            backends: HashMap::new(),
            sandbox: SandboxConfig::default(),
            confirmations: ConfirmationConfig::default(),
            compression: CompressionConfig::default(),
            guidelines: GuidelinesConfig::default(),
            max_iterations: default_max_iterations(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Resolve a backend by name, falling back to `default_backend`.
    pub fn backend(&self, name: Option<&str>) -> Option<(&str, &BackendConfig)> {
        let key = name.unwrap_or(&self.default_backend);
        self.backends.get_key_value(key).map(|(k, v)| (k.as_str(), v))
    }
}

/// Wire dialect spoken by a backend endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Hosted OpenAI-compatible chat completions API (bearer auth, SSE stream).
    #[serde(rename = "openai-compat")]
    OpenAiCompat,
    /// Local model runtime speaking the Ollama wire format (NDJSON stream).
    #[serde(rename = "local-runtime", alias = "ollama")]
    LocalRuntime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub kind: BackendKind,
    /// Base URL of the endpoint, without the API path suffix.
    pub url: String,
    /// Model identifier forwarded to the API.
    pub model: String,
    /// Per-request wall-clock timeout in seconds (non-streaming requests).
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// API key; required for `openai-compat` backends.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Maximum number of tool calls accepted from one assistant message.
    /// `None` means unlimited.  Learned constraints from
    /// `model_metadata.json` override this at startup.
    #[serde(default)]
    pub max_parallel_tools: Option<usize>,
    /// Context window of the model, used for the near-full warning.
    /// `None` disables the warning.
    #[serde(default)]
    pub context_max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Maximum file size in bytes accepted by read/search tools.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Globs that are never accessible, regardless of caller flags.
    #[serde(default = "default_blocked_paths")]
    pub blocked_paths: Vec<String>,
    /// Globs pruned from recursive listing/search unless the caller passes
    /// `include_ignored`.
    #[serde(default = "default_ignored_paths")]
    pub ignored_paths: Vec<String>,
    /// Shell command allow-list globs.  `None` allows everything.
    #[serde(default)]
    pub allowed_commands: Option<Vec<String>>,
}

fn default_blocked_paths() -> Vec<String> {
    [
        "**/.env",
        "**/*.key",
        "**/*.pem",
        "**/id_rsa",
        "**/credentials.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignored_paths() -> Vec<String> {
    [
        // Python virtual environments
        "**/.venv/**",
        "**/venv/**",
        "**/env/**",
        "**/.virtualenv/**",
        // Dependency trees
        "**/node_modules/**",
        // Version control metadata
        "**/.git/**",
        // Interpreter / tool caches
        "**/__pycache__/**",
        "**/.pytest_cache/**",
        "**/.mypy_cache/**",
        "**/.ruff_cache/**",
        // Build artifacts
        "**/build/**",
        "**/dist/**",
        "**/*.egg-info/**",
        "**/target/**",
        // IDE state
        "**/.vscode/**",
        "**/.idea/**",
        "**/.DS_Store",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            blocked_paths: default_blocked_paths(),
            ignored_paths: default_ignored_paths(),
            allowed_commands: None,
        }
    }
}

/// Informational confirmation switches.
///
/// The gate keys off each tool's static `requires_confirmation` flag; these
/// fields are retained so configs documenting the behaviour keep parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_true")]
    pub text_operations: bool,
    #[serde(default = "default_true")]
    pub shell_commands: bool,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self { text_operations: true, shell_commands: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Compress automatically when the transcript reaches `auto_threshold`.
    #[serde(default)]
    pub auto_enabled: bool,
    /// Message count at which automatic compression triggers.
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: usize,
    /// Number of trailing messages preserved verbatim by compression.
    #[serde(default = "default_auto_keep")]
    pub auto_keep: usize,
    /// Fraction (0–1) of the context budget at which a warning is shown.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f32,
    /// Hard cap on transcript length.  `None` means unlimited.
    #[serde(default)]
    pub max_messages: Option<usize>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            auto_enabled: false,
            auto_threshold: default_auto_threshold(),
            auto_keep: default_auto_keep(),
            warning_threshold: default_warning_threshold(),
            max_messages: None,
        }
    }
}

/// Behaviour on startup (and after compression/reset) when a guidelines
/// source file is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidelinesLoadMode {
    /// Prompt the user before compiling/injecting.
    #[default]
    Confirm,
    /// Always compile and inject without asking.
    Auto,
    /// Never load guidelines.
    Off,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuidelinesConfig {
    #[serde(default)]
    pub load_mode: GuidelinesLoadMode,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
