// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module format inference
//!
//! Decides whether a file's compiled output must be ECMAScript-module or
//! CommonJS shaped, mirroring the host loader's own decision exactly:
//!
//! 1. `.mjs` / `.mts` are always `module`; `.cjs` / `.cts` always `commonjs`
//! 2. otherwise the nearest `package.json` `"type"` field decides
//! 3. otherwise `commonjs`

use serde::Deserialize;
use std::path::Path;

/// Output dialect the transformation must emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleFormat {
    /// `require()` / `module.exports`
    CommonJs,
    /// `import` / `export`
    Esm,
}

impl ModuleFormat {
    /// The name used by manifests and transform engines
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleFormat::CommonJs => "commonjs",
            ModuleFormat::Esm => "module",
        }
    }

    /// Format reserved by a file extension, if unambiguous
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mjs" | "mts") => Some(ModuleFormat::Esm),
            Some("cjs" | "cts") => Some(ModuleFormat::CommonJs),
            _ => None,
        }
    }
}

/// Infer the output format for a file in `dir`.
///
/// A reserved extension wins outright; an ambiguous one defers to the
/// nearest package manifest's `"type"` declaration; the default is
/// `commonjs`.
pub fn infer_format(dir: &Path, filename: &Path) -> ModuleFormat {
    if let Some(format) = ModuleFormat::from_extension(filename) {
        return format;
    }

    match find_package_type(dir).as_deref() {
        Some("module") => ModuleFormat::Esm,
        _ => ModuleFormat::CommonJs,
    }
}

/// Walk upward from `dir` for the nearest package.json "type" field
fn find_package_type(dir: &Path) -> Option<String> {
    let mut current = Some(dir);

    while let Some(dir) = current {
        let pkg_path = dir.join("package.json");
        if pkg_path.is_file() {
            let content = std::fs::read_to_string(&pkg_path).ok()?;
            return match serde_json::from_str::<PackageManifest>(&content) {
                Ok(pkg) => pkg.type_field,
                Err(_) => None,
            };
        }
        current = dir.parent();
    }

    None
}

/// Minimal package.json structure for type detection
#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(rename = "type")]
    type_field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reserved_extensions() {
        assert_eq!(
            ModuleFormat::from_extension(Path::new("foo.mjs")),
            Some(ModuleFormat::Esm)
        );
        assert_eq!(
            ModuleFormat::from_extension(Path::new("foo.mts")),
            Some(ModuleFormat::Esm)
        );
        assert_eq!(
            ModuleFormat::from_extension(Path::new("foo.cjs")),
            Some(ModuleFormat::CommonJs)
        );
        assert_eq!(
            ModuleFormat::from_extension(Path::new("foo.cts")),
            Some(ModuleFormat::CommonJs)
        );
        assert_eq!(ModuleFormat::from_extension(Path::new("foo.js")), None);
        assert_eq!(ModuleFormat::from_extension(Path::new("foo.ts")), None);
    }

    #[test]
    fn test_reserved_extension_beats_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"type":"module"}"#).unwrap();

        assert_eq!(
            infer_format(dir.path(), Path::new("foo.cjs")),
            ModuleFormat::CommonJs
        );
    }

    #[test]
    fn test_package_type_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"type":"module"}"#).unwrap();

        assert_eq!(
            infer_format(dir.path(), Path::new("foo.js")),
            ModuleFormat::Esm
        );
        assert_eq!(
            infer_format(dir.path(), Path::new("foo.ts")),
            ModuleFormat::Esm
        );
    }

    #[test]
    fn test_package_type_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"type":"module"}"#).unwrap();
        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(infer_format(&nested, Path::new("foo.js")), ModuleFormat::Esm);
    }

    #[test]
    fn test_default_commonjs() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            infer_format(dir.path(), Path::new("foo.js")),
            ModuleFormat::CommonJs
        );
    }

    #[test]
    fn test_unparseable_manifest_defaults_commonjs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{not json").unwrap();

        assert_eq!(
            infer_format(dir.path(), Path::new("foo.js")),
            ModuleFormat::CommonJs
        );
    }
}
