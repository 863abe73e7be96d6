// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
mod agent;
mod compress;
mod confirm;
mod guidelines;
mod prompts;

pub use agent::{AgentLoop, TurnError};
pub use compress::{
    should_auto_compress, CompressionOutcome, CompressionRecord, Compressor, SUMMARY_FOOTER,
    SUMMARY_HEADER,
};
pub use confirm::{AcceptAll, ConfirmationGate, ConfirmationMode, ModeCell, RefuseAll};
pub use guidelines::{GuidelinesManager, GUIDELINES_FOOTER, GUIDELINES_HEADER};
pub use prompts::default_system_preamble;
