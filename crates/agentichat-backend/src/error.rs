// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Category of a backend failure.  Drives retry eligibility and the
/// user-facing handling in the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    RateLimit,
    ContextTooLong,
    ModelNotFound,
    Timeout,
    ServerError,
    AuthError,
    Unknown,
}

/// Error raised by backend adapters.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    /// HTTP status when the failure came from a response, `None` for
    /// transport-level failures.
    pub status_code: Option<u16>,
    pub kind: BackendErrorKind,
}

impl BackendError {
    pub fn new(message: impl Into<String>, kind: BackendErrorKind) -> Self {
        Self { message: message.into(), status_code: None, kind }
    }

    /// Classify an HTTP error response from its status and body text.
    /// Payload hints ("context length", "tokens per minute") refine the
    /// status-derived category.
    pub fn from_response(status: u16, body: &str) -> Self {
        let kind = classify_payload(body).unwrap_or_else(|| classify_status(status));
        Self {
            message: format!("HTTP {status}: {body}"),
            status_code: Some(status),
            kind,
        }
    }

    /// Classify a transport-level failure (connect error, timeout, ...).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(format!("timeout: {err}"), BackendErrorKind::Timeout)
        } else {
            Self::new(format!("connection error: {err}"), BackendErrorKind::ServerError)
        }
    }

    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::RateLimit | BackendErrorKind::ServerError | BackendErrorKind::Timeout
        )
    }
}

/// Map an HTTP status to an error category.
pub fn classify_status(status: u16) -> BackendErrorKind {
    match status {
        401 | 403 => BackendErrorKind::AuthError,
        404 => BackendErrorKind::ModelNotFound,
        429 => BackendErrorKind::RateLimit,
        s if s >= 500 => BackendErrorKind::ServerError,
        _ => BackendErrorKind::Unknown,
    }
}

/// Look for category hints in an error payload.  Providers report context
/// overflows and per-minute throttles with a 4xx status whose body text is
/// the only reliable signal.
pub fn classify_payload(body: &str) -> Option<BackendErrorKind> {
    let lower = body.to_lowercase();
    if lower.contains("context length") {
        Some(BackendErrorKind::ContextTooLong)
    } else if lower.contains("tokens per minute") {
        Some(BackendErrorKind::RateLimit)
    } else {
        None
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
