// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Specifier resolution for the host loader
//!
//! Implements the familiar algorithm: builtins, then relative/absolute
//! paths with extension probing, then a `node_modules` walk. The active
//! resolution primitive is a swappable slot on the runtime so resolution
//! patches (the alias hook) can wrap it.

use crate::error::{RegisterError, Result};
use crate::runtime::Runtime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builtin module names the host recognizes
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "console",
    "crypto",
    "events",
    "fs",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "process",
    "querystring",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "vm",
    "zlib",
];

/// Check whether a specifier names a builtin module, with or without the
/// `node:` prefix
pub fn is_builtin(name: &str) -> bool {
    let name = name.strip_prefix("node:").unwrap_or(name);
    BUILTIN_MODULES.contains(&name)
}

/// Result of resolving a specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Builtin module name, `node:` prefix stripped
    Builtin(String),
    /// File on disk
    Path(PathBuf),
}

/// One resolution request. All fields travel through resolution patches
/// positionally intact; wrappers may only substitute the specifier.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// The specifier as requested
    pub specifier: String,
    /// File issuing the request, when known
    pub parent: Option<PathBuf>,
    /// Whether this load is the process entry point
    pub is_main: bool,
}

/// The runtime's low-level resolution primitive
pub type ResolveHook = Arc<dyn Fn(&Runtime, &ResolveRequest) -> Result<Resolved> + Send + Sync>;

/// The unpatched resolution primitive
pub fn native_resolve(runtime: &Runtime, request: &ResolveRequest) -> Result<Resolved> {
    let specifier = request.specifier.as_str();

    if is_builtin(specifier) {
        let name = specifier.strip_prefix("node:").unwrap_or(specifier);
        return Ok(Resolved::Builtin(name.to_string()));
    }

    let parent_dir = request
        .parent
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| runtime.cwd());

    if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/') {
        return resolve_file(runtime, &parent_dir.join(specifier), specifier);
    }
    if Path::new(specifier).is_absolute() {
        return resolve_file(runtime, Path::new(specifier), specifier);
    }

    resolve_node_modules(runtime, specifier, &parent_dir)
}

/// Resolve a concrete path: exact, with extensions appended, then as a
/// directory
fn resolve_file(runtime: &Runtime, path: &Path, specifier: &str) -> Result<Resolved> {
    if path.is_file() {
        return Ok(Resolved::Path(path.to_path_buf()));
    }

    if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
        for ext in runtime.resolution_extensions() {
            let candidate = path.with_file_name(format!("{name}{ext}"));
            if candidate.is_file() {
                return Ok(Resolved::Path(candidate));
            }
        }
    }

    if path.is_dir() {
        return resolve_directory(runtime, path, specifier);
    }

    Err(RegisterError::module_not_found(specifier))
}

/// Resolve a directory through its package manifest `main`, then index
/// files
fn resolve_directory(runtime: &Runtime, dir: &Path, specifier: &str) -> Result<Resolved> {
    let manifest = dir.join("package.json");
    if manifest.is_file() {
        if let Ok(content) = std::fs::read_to_string(&manifest) {
            if let Ok(pkg) = serde_json::from_str::<PackageJson>(&content) {
                if let Some(main) = pkg.main {
                    let main_path = dir.join(&main);
                    if main_path.is_file() {
                        return Ok(Resolved::Path(main_path));
                    }
                    if let Ok(resolved) = resolve_file(runtime, &main_path, specifier) {
                        return Ok(resolved);
                    }
                }
            }
        }
    }

    for ext in runtime.resolution_extensions() {
        let index = dir.join(format!("index{ext}"));
        if index.is_file() {
            return Ok(Resolved::Path(index));
        }
    }

    Err(RegisterError::module_not_found(specifier))
}

/// Walk up the directory tree probing `node_modules` for a bare specifier
fn resolve_node_modules(runtime: &Runtime, specifier: &str, from_dir: &Path) -> Result<Resolved> {
    let (package_name, subpath) = parse_package_specifier(specifier);

    let mut current = Some(from_dir);
    while let Some(dir) = current {
        let package_root = dir.join("node_modules").join(package_name);

        if package_root.exists() {
            return match subpath {
                Some(sub) => resolve_file(runtime, &package_root.join(sub), specifier),
                None => resolve_directory(runtime, &package_root, specifier),
            };
        }

        current = dir.parent();
    }

    Err(RegisterError::module_not_found(specifier))
}

/// Split a package specifier into name and optional subpath, handling
/// scoped packages
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    if let Some(rest) = specifier.strip_prefix('@') {
        if let Some(scope_slash) = rest.find('/') {
            let after_scope = &rest[scope_slash + 1..];
            if let Some(subpath_slash) = after_scope.find('/') {
                let name_end = 1 + scope_slash + 1 + subpath_slash;
                return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
            }
        }
        (specifier, None)
    } else if let Some(slash) = specifier.find('/') {
        (&specifier[..slash], Some(&specifier[slash + 1..]))
    } else {
        (specifier, None)
    }
}

/// Minimal package.json structure for directory resolution
#[derive(Debug, Deserialize)]
struct PackageJson {
    main: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("path"));
        assert!(is_builtin("node:fs"));
        assert!(!is_builtin("lodash"));
        assert!(!is_builtin("node:lodash"));
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("lodash"), ("lodash", None));
        assert_eq!(
            parse_package_specifier("lodash/get"),
            ("lodash", Some("get"))
        );
        assert_eq!(
            parse_package_specifier("@types/node"),
            ("@types/node", None)
        );
        assert_eq!(
            parse_package_specifier("@babel/core/lib/index"),
            ("@babel/core", Some("lib/index"))
        );
    }

    #[test]
    fn test_relative_resolution_with_extension_probing() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("app.js");
        fs::write(&entry, "").unwrap();
        fs::write(dir.path().join("dep.js"), "").unwrap();

        let runtime = Runtime::new();
        let request = ResolveRequest {
            specifier: "./dep".to_string(),
            parent: Some(entry),
            is_main: false,
        };

        assert_eq!(
            native_resolve(&runtime, &request).unwrap(),
            Resolved::Path(dir.path().join("dep.js"))
        );
    }

    #[test]
    fn test_directory_index_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir(&lib).unwrap();
        fs::write(lib.join("index.js"), "").unwrap();
        let entry = dir.path().join("app.js");
        fs::write(&entry, "").unwrap();

        let runtime = Runtime::new();
        let request = ResolveRequest {
            specifier: "./lib".to_string(),
            parent: Some(entry),
            is_main: false,
        };

        assert_eq!(
            native_resolve(&runtime, &request).unwrap(),
            Resolved::Path(lib.join("index.js"))
        );
    }

    #[test]
    fn test_node_modules_walk() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("node_modules").join("leftpad");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), r#"{"main": "lib.js"}"#).unwrap();
        fs::write(pkg.join("lib.js"), "").unwrap();

        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();
        let entry = nested.join("app.js");
        fs::write(&entry, "").unwrap();

        let runtime = Runtime::new();
        let request = ResolveRequest {
            specifier: "leftpad".to_string(),
            parent: Some(entry),
            is_main: false,
        };

        assert_eq!(
            native_resolve(&runtime, &request).unwrap(),
            Resolved::Path(pkg.join("lib.js"))
        );
    }

    #[test]
    fn test_not_found_names_specifier() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("app.js");
        fs::write(&entry, "").unwrap();

        let runtime = Runtime::new();
        let request = ResolveRequest {
            specifier: "./missing".to_string(),
            parent: Some(entry),
            is_main: false,
        };

        match native_resolve(&runtime, &request).unwrap_err() {
            RegisterError::ModuleNotFound(name) => assert_eq!(name, "./missing"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
