// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
mod backend;
mod error;
mod extract;
mod mock;
mod ollama;
mod openai_compat;
mod types;

pub use backend::{Backend, BackendState, CumulativeUsage, RetryInfo, TextStream};
pub use error::{BackendError, BackendErrorKind};
pub use extract::extract_tool_calls;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use types::{
    estimate_messages_tokens, ChatResponse, FinishReason, Message, Role, TokenUsage, ToolCall,
};

use std::sync::Arc;

use agentichat_config::{BackendConfig, BackendKind};

/// Construct a boxed [`Backend`] from a named configuration entry.
pub fn from_config(name: &str, cfg: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError> {
    match cfg.kind {
        BackendKind::OpenAiCompat => Ok(Arc::new(OpenAiCompatBackend::from_config(name, cfg)?)),
        BackendKind::LocalRuntime => Ok(Arc::new(OllamaBackend::from_config(name, cfg))),
    }
}
