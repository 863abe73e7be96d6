// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
mod registry;
mod sandbox;
mod tool;

pub use builtin::register_builtin;
pub use registry::ToolRegistry;
pub use sandbox::{Sandbox, SandboxError};
pub use tool::{Tool, ToolResult};
