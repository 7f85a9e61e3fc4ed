// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Transformation invoker
//!
//! Derives per-file engine options (configuration, format, syntax kind),
//! invokes the external engine, registers the produced source map, and
//! applies the narrow legacy-runtime rewrite for `node:`-prefixed requires.

use crate::config::ConfigResolver;
use crate::error::{RegisterError, Result};
use crate::format::{infer_format, ModuleFormat};
use crate::sourcemap::SourceMapRegistry;
use crate::transform::{
    default_loaders, Diagnostic, Loader, Severity, Transform, TransformOptions,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Marker banner injected into every compiled unit. Source carrying it is
/// already compiled and is returned unchanged.
pub const COMPILE_MARKER: &str = "/* compiled by presto-register */";

/// Variable the bundle-mode file scope binds `__dirname` to
const DIRNAME_VAR: &str = "__presto_register_dirname__";
/// Variable the bundle-mode file scope binds `__filename` to
const FILENAME_VAR: &str = "__presto_register_filename__";
/// Variable the bundle-mode file scope binds `import.meta.url` to
const IMPORT_META_URL_VAR: &str = "__presto_register_import_meta_url__";

/// Result of compiling one file
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// The file the source came from
    pub source_path: PathBuf,
    /// Runnable code, executed once and not retained
    pub code: String,
    /// Structured source map, also registered under `source_path`
    pub source_map: String,
    /// Output dialect of `code`
    pub format: ModuleFormat,
}

/// Caller overrides passed through to the engine
#[derive(Default)]
pub struct CompileOptions {
    /// JSX factory, replacing any manifest setting
    pub jsx_factory: Option<String>,
    /// JSX fragment factory, replacing any manifest setting
    pub jsx_fragment: Option<String>,
    /// Target language level, replacing manifest and runtime defaults
    pub target: Option<String>,
    /// Compile-time substitutions
    pub define: BTreeMap<String, String>,
    /// Extra prologue appended after the compile marker
    pub banner: Option<String>,
    /// Files injected into every compiled unit
    pub inject: Vec<String>,
    /// Extension-to-loader overrides merged over the default table
    pub loaders: HashMap<String, Loader>,
}

/// Invokes the external engine with derived options
pub struct Compiler {
    transformer: Arc<dyn Transform>,
    configs: ConfigResolver,
    registry: Arc<SourceMapRegistry>,
    options: CompileOptions,
    loaders: HashMap<String, Loader>,
    default_target: String,
    strip_node_prefix: bool,
    node_prefix_re: Regex,
}

impl Compiler {
    /// Create a compiler bound to one engine, one registry and one
    /// configuration cache. `runtime_version` decides whether the
    /// `node:`-prefix rewrite applies (versions before 14.18 do not
    /// understand the prefix under `require`).
    pub fn new(
        transformer: Arc<dyn Transform>,
        registry: Arc<SourceMapRegistry>,
        options: CompileOptions,
        runtime_version: (u32, u32),
    ) -> Self {
        let mut loaders = default_loaders();
        for (ext, loader) in &options.loaders {
            loaders.insert(ext.clone(), *loader);
        }

        Self {
            transformer,
            configs: ConfigResolver::new(),
            registry,
            default_target: format!("node{}.{}", runtime_version.0, runtime_version.1),
            strip_node_prefix: runtime_version < (14, 18),
            node_prefix_re: Regex::new(r#"require\("node:([^"]+)"\)"#)
                .expect("static pattern"),
            options,
            loaders,
        }
    }

    /// The registry compiled maps are written to
    pub fn registry(&self) -> &Arc<SourceMapRegistry> {
        &self.registry
    }

    /// The configuration cache (invalidated by building a new compiler)
    pub fn configs(&self) -> &ConfigResolver {
        &self.configs
    }

    /// Compile one file's source.
    ///
    /// `format_hint` forces the output dialect; otherwise it is inferred
    /// from the extension and the nearest package manifest. Source already
    /// carrying the compile marker is returned unchanged.
    pub fn compile(
        &self,
        source: &str,
        file_path: &Path,
        format_hint: Option<ModuleFormat>,
    ) -> Result<CompiledUnit> {
        let dir = file_path.parent().unwrap_or(Path::new("."));
        let format = format_hint.unwrap_or_else(|| infer_format(dir, file_path));

        if source.contains(COMPILE_MARKER) {
            return Ok(CompiledUnit {
                source_path: file_path.to_path_buf(),
                code: source.to_string(),
                source_map: String::new(),
                format,
            });
        }

        let options = self.engine_options(file_path, format);
        let output = self.transformer.transform(source, &options)?;
        self.surface_diagnostics(&output.diagnostics, file_path)?;

        self.finish(file_path, format, output.code, output.source_map)
    }

    /// Compile a whole module graph starting at `entry`, with the entry's
    /// file scope (`__dirname`, `__filename`, `import.meta.url`) bound to
    /// injected variables
    pub fn bundle(&self, entry: &Path) -> Result<CompiledUnit> {
        let dir = entry.parent().unwrap_or(Path::new("."));
        let format = infer_format(dir, entry);

        let mut options = self.engine_options(entry, format);
        options.define.insert("__dirname".to_string(), DIRNAME_VAR.to_string());
        options.define.insert("__filename".to_string(), FILENAME_VAR.to_string());
        options
            .define
            .insert("import.meta.url".to_string(), IMPORT_META_URL_VAR.to_string());
        options.banner = format!(
            "{}\nconst {FILENAME_VAR} = {};\nconst {DIRNAME_VAR} = {};\nconst {IMPORT_META_URL_VAR} = {};",
            options.banner,
            serde_json::Value::String(entry.display().to_string()),
            serde_json::Value::String(dir.display().to_string()),
            serde_json::Value::String(format!("file://{}", entry.display())),
        );

        let output = self.transformer.bundle(entry, &options)?;
        self.surface_diagnostics(&output.diagnostics, entry)?;

        self.finish(entry, format, output.code, output.source_map)
    }

    /// Options the engine sees for `file_path`
    fn engine_options(&self, file_path: &Path, format: ModuleFormat) -> TransformOptions {
        let dir = file_path.parent().unwrap_or(Path::new("."));
        let config = self.configs.resolve(dir);

        let mut options =
            TransformOptions::new(file_path.to_path_buf(), self.loader_for(file_path), format);
        options.target = self
            .options
            .target
            .clone()
            .or_else(|| config.target.clone())
            .unwrap_or_else(|| self.default_target.clone());
        // Per-call overrides replace the manifest settings, never merge
        options.jsx_factory = self
            .options
            .jsx_factory
            .clone()
            .or_else(|| config.jsx_factory.clone());
        options.jsx_fragment = self
            .options
            .jsx_fragment
            .clone()
            .or_else(|| config.jsx_fragment.clone());
        options.define = self.options.define.clone();
        options.inject = self.options.inject.clone();
        options.banner = match &self.options.banner {
            Some(banner) => format!("{COMPILE_MARKER}\n{banner}"),
            None => COMPILE_MARKER.to_string(),
        };
        options
    }

    /// Map an extension to its syntax kind; unknown extensions parse as
    /// plain script
    fn loader_for(&self, path: &Path) -> Loader {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        self.loaders.get(&ext).copied().unwrap_or(Loader::Js)
    }

    /// Fail on the first error diagnostic; log warnings and continue
    fn surface_diagnostics(&self, diagnostics: &[Diagnostic], file_path: &Path) -> Result<()> {
        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => {
                    let (file, line, column) = match &diagnostic.location {
                        Some(loc) => (loc.file.clone(), loc.line, loc.column),
                        None => (file_path.display().to_string(), 0, 0),
                    };
                    return Err(RegisterError::Compile {
                        file,
                        line,
                        column,
                        message: diagnostic.message.clone(),
                    });
                }
                Severity::Warning => match &diagnostic.location {
                    Some(loc) => tracing::warn!(
                        "{}:{}:{}: {}",
                        loc.file,
                        loc.line,
                        loc.column,
                        diagnostic.message
                    ),
                    None => tracing::warn!("{}: {}", file_path.display(), diagnostic.message),
                },
            }
        }
        Ok(())
    }

    /// Post-process output and register its map
    fn finish(
        &self,
        file_path: &Path,
        format: ModuleFormat,
        code: String,
        source_map: String,
    ) -> Result<CompiledUnit> {
        let code = if format == ModuleFormat::CommonJs && self.strip_node_prefix {
            self.node_prefix_re
                .replace_all(&code, "require(\"$1\")")
                .into_owned()
        } else {
            code
        };

        let source_path = file_path
            .canonicalize()
            .unwrap_or_else(|_| file_path.to_path_buf());
        if !source_map.is_empty() {
            self.registry.set(source_path.clone(), &source_map);
        }

        Ok(CompiledUnit {
            source_path,
            code,
            source_map,
            format,
        })
    }
}
