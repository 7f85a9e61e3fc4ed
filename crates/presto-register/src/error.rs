// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the register hook

use std::path::PathBuf;
use thiserror::Error;

/// Result type for register hook operations
pub type Result<T> = std::result::Result<T, RegisterError>;

/// Errors that can occur while hooking, compiling or resolving modules
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Module not found (names the specifier as originally requested)
    #[error("Cannot find module '{0}'")]
    ModuleNotFound(String),

    /// Module resolution error
    #[error("Error resolving module '{module}': {reason}")]
    ModuleResolution {
        /// Module specifier
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// Source failed transformation. Carries the original file path and
    /// location so callers see pre-transform coordinates.
    #[error("Transform failed: {file}:{line}:{column}: {message}")]
    Compile {
        /// Original source file
        file: String,
        /// 1-based line in the original source
        line: u32,
        /// 0-based column in the original source
        column: u32,
        /// Compiler message
        message: String,
    },

    /// The module must be loaded as an ECMAScript module and cannot be
    /// executed by the synchronous loader. Recovered by the legacy-loader
    /// patch through a forced CommonJS recompilation; rethrown everywhere
    /// else.
    #[error("Must use import to load ES Module: {}", .path.display())]
    RequireEsm {
        /// The offending file
        path: PathBuf,
    },

    /// Syntax rejected by the executor (wrong module format reached it)
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// Configuration manifest exists but could not be parsed. Always
    /// recovered inside the config resolver; never crosses the crate
    /// boundary.
    #[error("Failed to parse {}: {reason}", .path.display())]
    ConfigParse {
        /// Manifest path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// File system error
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl RegisterError {
    /// Create a module not found error
    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound(module.into())
    }

    /// Create a syntax error
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }
}
