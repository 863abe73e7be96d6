// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! Path jail for the tool set.
//!
//! Every filesystem-touching tool resolves its path arguments through a
//! shared [`Sandbox`].  The jail guarantees: the resolved path lies beneath
//! the workspace root after symlink resolution, never matches a blocked
//! glob, and read paths respect the file-size cap.  Ignored globs are
//! advisory pruning hints for recursive tools; blocked globs are mandatory.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use tracing::debug;

use agentichat_config::SandboxConfig;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("access denied: '{path}' escapes the workspace (root: {root})")]
    Escape { path: String, root: PathBuf },
    #[error("access denied: '{path}' matches blocked pattern '{pattern}'")]
    Blocked { path: String, pattern: String },
    #[error("file too large: {size} bytes (limit: {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("invalid path '{path}': {reason}")]
    BadPath { path: String, reason: String },
}

/// A compiled glob.  `*` matches within a path segment, `?` one character,
/// `**` across segments.  For `**` patterns the literal directory names are
/// kept so that `**/.venv/**` also matches the `.venv` directory itself.
#[derive(Debug)]
struct GlobPattern {
    raw: String,
    re: Regex,
    dir_components: Vec<String>,
}

impl GlobPattern {
    fn compile(pattern: &str) -> Option<Self> {
        let re = glob_to_regex(pattern)?;
        let dir_components = if pattern.contains("**") {
            pattern
                .split('/')
                .filter(|part| !part.is_empty() && *part != "**" && !part.contains('*') && !part.contains('?'))
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        Some(Self { raw: pattern.to_string(), re, dir_components })
    }

    fn matches(&self, rel: &str) -> bool {
        if self.re.is_match(rel) {
            return true;
        }
        // `**/name/**` style patterns also hit any path containing `name`
        // as a component, so the directory itself is covered.
        if !self.dir_components.is_empty() {
            let components: Vec<&str> = rel.split('/').collect();
            return self
                .dir_components
                .iter()
                .any(|dir| components.contains(&dir.as_str()));
        }
        false
    }
}

/// Translate a glob into an anchored [`Regex`].
///
/// `**/` at a segment boundary becomes an optional directory prefix so that
/// `**/.env` matches both `.env` and `a/b/.env`.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                re.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                re.push_str("[^/]");
                i += 1;
            }
            c => {
                re.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

pub struct Sandbox {
    root: PathBuf,
    max_file_size: u64,
    blocked: Vec<GlobPattern>,
    ignored: Vec<GlobPattern>,
    allowed_commands: Option<Vec<Regex>>,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>, config: &SandboxConfig) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        let compile = |patterns: &[String]| -> Vec<GlobPattern> {
            patterns.iter().filter_map(|p| GlobPattern::compile(p)).collect()
        };
        Self {
            root,
            max_file_size: config.max_file_size,
            blocked: compile(&config.blocked_paths),
            ignored: compile(&config.ignored_paths),
            allowed_commands: config.allowed_commands.as_deref().map(|patterns| {
                patterns.iter().filter_map(|p| command_glob_to_regex(p)).collect()
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Resolve a model-supplied path into a validated absolute path inside
    /// the jail.  Relative paths resolve against the root; absolute paths
    /// are accepted only when they canonicalize beneath it.
    pub fn validate(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let joined = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        };

        let resolved = canonicalize_lenient(&joined).map_err(|reason| SandboxError::BadPath {
            path: path.to_string(),
            reason,
        })?;

        if !resolved.starts_with(&self.root) {
            return Err(SandboxError::Escape {
                path: path.to_string(),
                root: self.root.clone(),
            });
        }

        let rel = resolved
            .strip_prefix(&self.root)
            .unwrap_or(&resolved)
            .to_string_lossy()
            .replace('\\', "/");
        for pattern in &self.blocked {
            if pattern.matches(&rel) {
                debug!(path = %rel, pattern = %pattern.raw, "blocked path");
                return Err(SandboxError::Blocked {
                    path: path.to_string(),
                    pattern: pattern.raw.clone(),
                });
            }
        }

        Ok(resolved)
    }

    /// Reject files above the configured size cap.  A file at exactly the
    /// cap passes; a missing file passes (the caller reports not-found).
    pub fn check_size(&self, path: &Path) -> Result<(), SandboxError> {
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() > self.max_file_size {
                return Err(SandboxError::TooLarge {
                    size: meta.len(),
                    limit: self.max_file_size,
                });
            }
        }
        Ok(())
    }

    /// Advisory check used by recursive tools to prune dependency trees,
    /// VCS metadata, caches, and similar noise.  Callers opt out with
    /// `include_ignored`.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let rel = match path.strip_prefix(&self.root) {
            Ok(r) => r,
            // Outside the workspace: not ignored (validate rejects it anyway).
            Err(_) if path.is_absolute() => return false,
            Err(_) => path,
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        self.ignored.iter().any(|p| p.matches(&rel))
    }

    /// Check a shell command against the allow-list.  No list means every
    /// command is permitted.
    pub fn command_allowed(&self, command: &str) -> bool {
        match &self.allowed_commands {
            None => true,
            Some(patterns) => patterns.iter().any(|p| p.is_match(command)),
        }
    }
}

/// Glob translation for command allow-lists: `*` matches anything
/// (commands are not paths, so separators have no meaning), `?` one char.
fn command_glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Canonicalize, tolerating nonexistent leaves.
///
/// For paths still to be created (write tools), the longest existing
/// ancestor is canonicalized and the remainder re-appended.  `..` segments
/// in the nonexistent remainder cannot be resolved safely and are rejected.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, String> {
    match std::fs::canonicalize(path) {
        Ok(p) => Ok(p),
        Err(_) => {
            let mut existing = path.to_path_buf();
            let mut remainder: Vec<std::ffi::OsString> = Vec::new();
            while !existing.exists() {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        remainder.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => return Err("no existing ancestor".into()),
                }
            }
            if path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
                && remainder.iter().any(|r| r == "..")
            {
                return Err("'..' through a nonexistent directory".into());
            }
            let mut resolved = std::fs::canonicalize(&existing)
                .map_err(|e| format!("cannot resolve ancestor: {e}"))?;
            for part in remainder.iter().rev() {
                if part == ".." {
                    return Err("'..' through a nonexistent directory".into());
                }
                resolved.push(part);
            }
            Ok(resolved)
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
