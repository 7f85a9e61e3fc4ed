// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # presto-register
//!
//! On-demand transformation hook for the Presto runtime: typed, JSX-capable
//! module-syntax source files execute as if natively supported. The first
//! load of a hooked file transforms its text through an external engine,
//! keeps the produced source map in memory, and rewrites stack traces back
//! to original source locations.
//!
//! The hook covers five concerns:
//!
//! - intercepting module loads for a configurable extension set
//! - per-directory compiler-configuration and module-format decisions
//! - invoking the external engine with derived options
//! - registering source maps for stack-trace rewriting
//! - resolving path-alias specifiers ahead of normal resolution
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use presto_register::{register, RegisterOptions, Runtime};
//!
//! fn main() -> presto_register::Result<()> {
//!     let runtime = Runtime::new();
//!     let registration = register(&runtime, RegisterOptions::default())?;
//!
//!     // .ts / .tsx / .jsx files now load transparently
//!     runtime.require("./src/server.ts", None)?;
//!
//!     registration.unregister();
//!     Ok(())
//! }
//! ```
//!
//! The transformation engine itself is a collaborator, plugged in through
//! the [`Transform`] trait; the crate only decides when, with what
//! options, and in what format to invoke it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod config;
pub mod error;
pub mod format;
pub mod hook;
pub mod paths;
pub mod runtime;
pub mod sourcemap;
pub mod transform;

// Re-exports
pub use compiler::{CompileOptions, CompiledUnit, Compiler, COMPILE_MARKER};
pub use config::{ConfigResolver, ProjectConfig, CONFIG_CANDIDATES};
pub use error::{RegisterError, Result};
pub use format::{infer_format, ModuleFormat};
pub use hook::{
    register, HookMatcher, RegisterOptions, Registration, BUNDLE_ENV_VAR, DEFAULT_EXTENSIONS,
};
pub use paths::MatchPath;
pub use runtime::{Module, Runtime, StackFrame, Value};
pub use sourcemap::{OriginalPosition, SourceMap, SourceMapRegistry};
pub use transform::{
    default_loaders, identity_mappings, Diagnostic, DiagnosticLocation, Loader,
    PassthroughTransform, Severity, SourceMapRequest, Transform, TransformOptions, TransformOutput,
};

/// Version of the register hook
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
