// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod schema;

pub use loader::{load, ConfigError};
pub use schema::{
    BackendConfig, BackendKind, CompressionConfig, Config, ConfirmationConfig, GuidelinesConfig,
    GuidelinesLoadMode, SandboxConfig,
};
