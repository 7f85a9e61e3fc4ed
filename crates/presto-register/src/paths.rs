// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Path-alias matching
//!
//! Rewrites bare specifiers through the project's `baseUrl` + `paths`
//! mapping before the runtime's normal resolution runs. Patterns are tried
//! in manifest order; within a pattern, substitution templates are tried in
//! order and the first one naming an existing file or directory wins.

use crate::config::ProjectConfig;
use std::path::{Path, PathBuf};

/// Extensions probed when checking whether a candidate exists on disk
const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Compiled alias matcher for one project
#[derive(Debug, Clone)]
pub struct MatchPath {
    base_url: PathBuf,
    aliases: Vec<(String, Vec<String>)>,
}

impl MatchPath {
    /// Build a matcher from a resolved project configuration.
    ///
    /// Returns `None` when the configuration carries no `baseUrl` or no
    /// alias patterns; the alias patch is skipped entirely in that case.
    pub fn from_config(config: &ProjectConfig) -> Option<Self> {
        let base_url = config.base_url.clone()?;
        if config.paths.is_empty() {
            return None;
        }
        Some(Self {
            base_url,
            aliases: config.paths.clone(),
        })
    }

    /// Rewrite `specifier` into an existing on-disk candidate, if any alias
    /// pattern matches
    pub fn resolve(&self, specifier: &str) -> Option<PathBuf> {
        for (pattern, templates) in &self.aliases {
            if let Some(found) = self.expand_alias(specifier, pattern, templates) {
                return Some(found);
            }
        }
        None
    }

    /// Expand one alias pattern against a specifier.
    ///
    /// E.g. pattern `@apis/*` with template `utils/apis/*` and specifier
    /// `@apis/foo` expands to `<base_url>/utils/apis/foo`, then probes
    /// extensions.
    fn expand_alias(&self, specifier: &str, pattern: &str, templates: &[String]) -> Option<PathBuf> {
        if let Some(prefix) = pattern.strip_suffix('*') {
            let rest = specifier.strip_prefix(prefix)?;
            for template in templates {
                if let Some(template_prefix) = template.strip_suffix('*') {
                    let base = self.base_url.join(format!("{template_prefix}{rest}"));
                    if let Some(found) = try_extensions(&base) {
                        return Some(found);
                    }
                }
            }
        } else if specifier == pattern {
            for template in templates {
                let base = self.base_url.join(template);
                if let Some(found) = try_extensions(&base) {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Probe a base path directly, with each known extension appended, then as
/// a directory with index files
fn try_extensions(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }

    let name = base.file_name()?.to_string_lossy().into_owned();
    for ext in RESOLVE_EXTENSIONS {
        let candidate = base.with_file_name(format!("{name}.{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if base.is_dir() {
        for ext in RESOLVE_EXTENSIONS {
            let index = base.join(format!("index.{ext}"));
            if index.is_file() {
                return Some(index);
            }
        }
    }

    None
}
