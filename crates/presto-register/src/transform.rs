// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Transformation engine seam
//!
//! The engine itself is an external collaborator: anything that can turn
//! source text into runnable code plus a source map plugs in through the
//! [`Transform`] trait. This module only fixes the contract: syntax kinds,
//! option passing, and the diagnostics shape.

use crate::error::{RegisterError, Result};
use crate::format::ModuleFormat;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Syntax kind a file is parsed as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Loader {
    /// Plain script
    Js,
    /// JSX-enabled script
    Jsx,
    /// Typed script
    Ts,
    /// Typed JSX script
    Tsx,
}

/// Default extension-to-loader table. Fixed at hook-install time;
/// individual entries can be overridden by caller configuration.
pub fn default_loaders() -> HashMap<String, Loader> {
    let mut table = HashMap::new();
    for (ext, loader) in [
        (".js", Loader::Js),
        (".mjs", Loader::Js),
        (".cjs", Loader::Js),
        (".jsx", Loader::Jsx),
        (".ts", Loader::Ts),
        (".mts", Loader::Ts),
        (".cts", Loader::Ts),
        (".tsx", Loader::Tsx),
    ] {
        table.insert(ext.to_string(), loader);
    }
    table
}

/// Requested source-map output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMapRequest {
    /// Inline `sourceMappingURL` comment only
    Inline,
    /// Structured map only
    External,
    /// Inline comment plus structured map
    Both,
}

/// Options derived per compile and handed to the engine
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Syntax kind of the input
    pub loader: Loader,
    /// Output dialect the runtime will accept
    pub format: ModuleFormat,
    /// Target language level, e.g. `es2020` or `node20.11`
    pub target: String,
    /// File the source came from, for map and diagnostic attribution
    pub sourcefile: PathBuf,
    /// JSX factory name override
    pub jsx_factory: Option<String>,
    /// JSX fragment factory name override
    pub jsx_fragment: Option<String>,
    /// Compile-time substitutions, applied before parsing
    pub define: BTreeMap<String, String>,
    /// Prologue prepended verbatim to the output
    pub banner: String,
    /// Files whose exports are injected into every compiled unit
    pub inject: Vec<String>,
    /// Requested map shape
    pub source_map: SourceMapRequest,
}

impl TransformOptions {
    /// Options for `sourcefile` with everything else at its neutral value
    pub fn new(sourcefile: PathBuf, loader: Loader, format: ModuleFormat) -> Self {
        Self {
            loader,
            format,
            target: String::new(),
            sourcefile,
            jsx_factory: None,
            jsx_fragment: None,
            define: BTreeMap::new(),
            banner: String::new(),
            inject: Vec::new(),
            source_map: SourceMapRequest::Both,
        }
    }
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Advisory; surfaced to the logging sink, never blocks execution
    Warning,
    /// Fatal; fails the module load
    Error,
}

/// Location a diagnostic points at
#[derive(Debug, Clone)]
pub struct DiagnosticLocation {
    /// Source file
    pub file: String,
    /// 1-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

/// One engine diagnostic
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity class
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Where it points, when known
    pub location: Option<DiagnosticLocation>,
}

/// Engine output for one compile
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Runnable code in the requested format
    pub code: String,
    /// Structured source map as JSON, empty when none was produced
    pub source_map: String,
    /// Warnings and errors from the engine
    pub diagnostics: Vec<Diagnostic>,
}

/// Black-box source-to-source transformation service
pub trait Transform: Send + Sync {
    /// Transform one file's source text
    fn transform(&self, source: &str, options: &TransformOptions) -> Result<TransformOutput>;

    /// Compile a whole module graph starting at `entry`. Engines that only
    /// do per-file work keep the default, which rejects bundle mode.
    fn bundle(&self, entry: &Path, _options: &TransformOptions) -> Result<TransformOutput> {
        Err(RegisterError::Compile {
            file: entry.display().to_string(),
            line: 0,
            column: 0,
            message: "this transformer does not support whole-graph compilation".to_string(),
        })
    }
}

/// Identity mappings for output whose prologue pushed the source down by
/// `prologue_lines`, leaving `source_lines` otherwise untouched. Useful for
/// engines (and tests) that only prepend banners.
pub fn identity_mappings(prologue_lines: usize, source_lines: usize) -> String {
    let mut mappings = String::new();
    for _ in 0..prologue_lines {
        mappings.push(';');
    }
    for line in 0..source_lines {
        if line == 0 {
            mappings.push_str("AAAA");
        } else {
            mappings.push_str(";AACA");
        }
    }
    mappings
}

/// Transformer that passes source through untouched apart from the
/// requested banner. Stands in until a real engine is plugged in.
pub struct PassthroughTransform;

impl Transform for PassthroughTransform {
    fn transform(&self, source: &str, options: &TransformOptions) -> Result<TransformOutput> {
        let (code, prologue_lines) = if options.banner.is_empty() {
            (source.to_string(), 0)
        } else {
            (format!("{}\n{}", options.banner, source), options.banner.lines().count())
        };

        let map = serde_json::json!({
            "version": 3,
            "sources": [options.sourcefile.display().to_string()],
            "mappings": identity_mappings(prologue_lines, source.lines().count()),
        });

        Ok(TransformOutput {
            code,
            source_map: map.to_string(),
            diagnostics: Vec::new(),
        })
    }
}
