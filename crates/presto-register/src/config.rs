// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Project configuration resolution
//!
//! Finds the nearest `tsconfig.json` (or `jsconfig.json`) above a directory
//! and extracts the compiler-relevant subset. Manifests are parsed
//! permissively: comments and trailing commas are tolerated, and any parse
//! failure degrades to an empty configuration instead of failing the module
//! load.

use crate::error::{RegisterError, Result};
use crate::format::ModuleFormat;
use dashmap::DashMap;
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Manifest names probed at each directory level, in order
pub const CONFIG_CANDIDATES: &[&str] = &["tsconfig.json", "jsconfig.json"];

/// Compiler-relevant subset of a project manifest
#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
    /// `compilerOptions.jsxFactory`
    pub jsx_factory: Option<String>,
    /// `compilerOptions.jsxFragmentFactory`
    pub jsx_fragment: Option<String>,
    /// `compilerOptions.target`
    pub target: Option<String>,
    /// `compilerOptions.baseUrl`, absolutized against the manifest directory
    pub base_url: Option<PathBuf>,
    /// `compilerOptions.paths`, in manifest order
    pub paths: Vec<(String, Vec<String>)>,
    /// `compilerOptions.module`, when it names a recognizable dialect.
    /// Carried for completeness of the manifest subset; format decisions
    /// themselves always follow the host loader (see `format`).
    pub module_kind: Option<ModuleFormat>,
}

/// Per-directory configuration resolver with a process-lifetime cache.
///
/// A resolver instance is created at hook install time, so reinstalling the
/// hook discards all cached entries.
pub struct ConfigResolver {
    cache: DashMap<PathBuf, Arc<ProjectConfig>>,
}

impl ConfigResolver {
    /// Create a resolver with an empty cache
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Resolve the configuration applying to files in `dir`.
    ///
    /// Only the nearest manifest is consulted; it is not merged with
    /// ancestors. Never fails: unreadable or malformed manifests yield the
    /// empty configuration.
    pub fn resolve(&self, dir: &Path) -> Arc<ProjectConfig> {
        if let Some(cached) = self.cache.get(dir) {
            return Arc::clone(&cached);
        }

        let config = match find_manifest(dir) {
            Some(path) => match parse_manifest(&path) {
                Ok(config) => config,
                Err(err) => {
                    tracing::debug!("ignoring unparseable manifest: {}", err);
                    ProjectConfig::default()
                }
            },
            None => ProjectConfig::default(),
        };

        let config = Arc::new(config);
        self.cache.insert(dir.to_path_buf(), Arc::clone(&config));
        config
    }

    /// Path of the manifest that `resolve` would read for `dir`, if any
    pub fn config_path(&self, dir: &Path) -> Option<PathBuf> {
        find_manifest(dir)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk upward from `start` probing the candidate manifest names
fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();

    loop {
        for name in CONFIG_CANDIDATES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Read and extract the compiler-relevant subset of a manifest
fn parse_manifest(path: &Path) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    let normalized = normalize_jsonc(&content);

    let value: Json =
        serde_json::from_str(&normalized).map_err(|e| RegisterError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let manifest_dir = path.parent().unwrap_or(Path::new("."));
    let options = value.get("compilerOptions");

    let get_str = |key: &str| {
        options
            .and_then(|o| o.get(key))
            .and_then(Json::as_str)
            .map(String::from)
    };

    let base_url = get_str("baseUrl").map(|b| manifest_dir.join(b));

    let mut paths = Vec::new();
    if let Some(map) = options
        .and_then(|o| o.get("paths"))
        .and_then(Json::as_object)
    {
        for (pattern, targets) in map {
            let templates: Vec<String> = targets
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            paths.push((pattern.clone(), templates));
        }
    }

    let module_kind = match get_str("module").as_deref() {
        Some("commonjs") | Some("CommonJS") => Some(ModuleFormat::CommonJs),
        Some(m) if m.to_ascii_lowercase().starts_with("es") => Some(ModuleFormat::Esm),
        _ => None,
    };

    Ok(ProjectConfig {
        jsx_factory: get_str("jsxFactory"),
        jsx_fragment: get_str("jsxFragmentFactory"),
        target: get_str("target"),
        base_url,
        paths,
        module_kind,
    })
}

/// Strip JSONC comments and trailing commas while respecting strings
pub(crate) fn normalize_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        let ch = bytes[i];

        // String literal, copied verbatim including escapes
        if ch == b'"' {
            out.push('"');
            i += 1;
            while i < len {
                let c = bytes[i];
                out.push(c as char);
                i += 1;
                if c == b'\\' && i < len {
                    out.push(bytes[i] as char);
                    i += 1;
                } else if c == b'"' {
                    break;
                }
            }
            continue;
        }

        // Line comment
        if ch == b'/' && i + 1 < len && bytes[i + 1] == b'/' {
            while i < len && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        // Block comment
        if ch == b'/' && i + 1 < len && bytes[i + 1] == b'*' {
            i += 2;
            while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                i += 1;
            }
            if i + 1 < len {
                i += 2;
            }
            continue;
        }

        // Trailing comma: a comma whose next non-whitespace (and
        // non-comment) character closes the container
        if ch == b',' {
            let mut j = i + 1;
            while j < len {
                match bytes[j] {
                    b' ' | b'\t' | b'\r' | b'\n' => j += 1,
                    b'/' if j + 1 < len && bytes[j + 1] == b'/' => {
                        while j < len && bytes[j] != b'\n' {
                            j += 1;
                        }
                    }
                    b'/' if j + 1 < len && bytes[j + 1] == b'*' => {
                        j += 2;
                        while j + 1 < len && !(bytes[j] == b'*' && bytes[j + 1] == b'/') {
                            j += 1;
                        }
                        if j + 1 < len {
                            j += 2;
                        }
                    }
                    _ => break,
                }
            }
            if j < len && (bytes[j] == b'}' || bytes[j] == b']') {
                i += 1;
                continue;
            }
        }

        out.push(ch as char);
        i += 1;
    }

    out
}
