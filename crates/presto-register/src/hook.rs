// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Hook installation
//!
//! Wires the compiler into the runtime's patchable slots: transform
//! handlers per extension, stack-trace rewriting, the legacy-loader
//! fallback for ESM-only requires, and the path-alias resolution patch.
//! Every patch captures the handler it replaced; unregistering reverts
//! them in strict LIFO order so patches layered by other code in between
//! are never clobbered.

use crate::compiler::{CompileOptions, CompiledUnit, Compiler};
use crate::error::{RegisterError, Result};
use crate::format::ModuleFormat;
use crate::paths::MatchPath;
use crate::runtime::{
    is_builtin, ExtensionHandler, FrameFormatter, ResolveHook, Runtime, StackFrame,
};
use crate::sourcemap::SourceMapRegistry;
use crate::transform::{Loader, PassthroughTransform, Transform};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Extensions hooked when the caller does not name any
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".ts", ".tsx", ".mjs"];

/// Environment variable selecting whole-graph compile mode when the
/// `bundle` option is unset
pub const BUNDLE_ENV_VAR: &str = "PRESTO_BUNDLE";

/// Predicate deciding whether a file is compiled by the hook
pub type HookMatcher = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Options accepted by [`register`]
pub struct RegisterOptions {
    /// The transformation engine
    pub transformer: Arc<dyn Transform>,
    /// Whole-graph compile mode; falls back to [`BUNDLE_ENV_VAR`] when
    /// unset. Mutually exclusive with per-file compilation.
    pub bundle: Option<bool>,
    /// Extensions to hook
    pub extensions: Vec<String>,
    /// Skip files under dependency directories (default true)
    pub hook_ignore_node_modules: bool,
    /// Inclusion predicate overriding the default exclusion rule
    pub hook_matcher: Option<HookMatcher>,
    /// JSX factory, replacing manifest settings
    pub jsx_factory: Option<String>,
    /// JSX fragment factory, replacing manifest settings
    pub jsx_fragment: Option<String>,
    /// Target language level, replacing manifest and runtime defaults
    pub target: Option<String>,
    /// Compile-time substitutions passed through to the engine
    pub define: BTreeMap<String, String>,
    /// Extra prologue appended after the compile marker
    pub banner: Option<String>,
    /// Files injected into every compiled unit
    pub inject: Vec<String>,
    /// Extension-to-loader overrides
    pub loaders: HashMap<String, Loader>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            transformer: Arc::new(PassthroughTransform),
            bundle: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            hook_ignore_node_modules: true,
            hook_matcher: None,
            jsx_factory: None,
            jsx_fragment: None,
            target: None,
            define: BTreeMap::new(),
            banner: None,
            inject: Vec::new(),
            loaders: HashMap::new(),
        }
    }
}

/// One applied patch: the slot it replaced and how to put it back
enum Patch {
    Extension {
        runtime: Runtime,
        ext: String,
        previous: Option<ExtensionHandler>,
    },
    Resolver {
        runtime: Runtime,
        previous: ResolveHook,
    },
    FrameFormatter {
        runtime: Runtime,
        previous: FrameFormatter,
    },
    InlineMaps {
        runtime: Runtime,
        previous: bool,
    },
}

impl Patch {
    /// Restore the slot to the handler captured at apply time
    fn revert(self) {
        match self {
            Patch::Extension {
                runtime,
                ext,
                previous,
            } => match previous {
                Some(handler) => {
                    runtime.swap_extension_handler(&ext, handler);
                }
                None => {
                    runtime.remove_extension_handler(&ext);
                }
            },
            Patch::Resolver { runtime, previous } => {
                runtime.swap_resolver(previous);
            }
            Patch::FrameFormatter { runtime, previous } => {
                runtime.swap_frame_formatter(previous);
            }
            Patch::InlineMaps { runtime, previous } => {
                runtime.set_inline_source_maps(previous);
            }
        }
    }
}

/// Live hook installation. Dropping it without calling
/// [`Registration::unregister`] leaves the patches in place for the rest
/// of the process.
pub struct Registration {
    patches: Vec<Patch>,
    registry: Arc<SourceMapRegistry>,
    compiler: Arc<Compiler>,
}

impl Registration {
    /// Revert every patch in strict LIFO order and clear the source map
    /// registry, restoring the runtime's pristine behavior
    pub fn unregister(mut self) {
        while let Some(patch) = self.patches.pop() {
            patch.revert();
        }
        self.registry.clear();
    }

    /// The registry compiled maps are written to
    pub fn registry(&self) -> &Arc<SourceMapRegistry> {
        &self.registry
    }

    /// The compiler driving the installed handlers
    pub fn compiler(&self) -> &Arc<Compiler> {
        &self.compiler
    }
}

/// Install the transformation hook on a runtime.
///
/// Applies, in order: per-extension transform handlers, stack-trace
/// source-map rewriting (native inline support when the runtime offers it,
/// else a registry-backed frame formatter), the legacy-loader fallback on
/// the plain-script handler, and the path-alias resolution patch. The
/// returned [`Registration`] reverses all of it.
pub fn register(runtime: &Runtime, options: RegisterOptions) -> Result<Registration> {
    let bundle = bundle_enabled(
        options.bundle,
        std::env::var(BUNDLE_ENV_VAR).ok().as_deref(),
    );
    let registry = Arc::new(SourceMapRegistry::new());
    let compiler = Arc::new(Compiler::new(
        Arc::clone(&options.transformer),
        Arc::clone(&registry),
        CompileOptions {
            jsx_factory: options.jsx_factory.clone(),
            jsx_fragment: options.jsx_fragment.clone(),
            target: options.target.clone(),
            define: options.define.clone(),
            banner: options.banner.clone(),
            inject: options.inject.clone(),
            loaders: options.loaders.clone(),
        },
        runtime.version(),
    ));
    let include = build_matcher(options.hook_matcher.clone(), options.hook_ignore_node_modules);

    let mut patches = Vec::new();

    // 1. Transform-and-execute handlers per extension
    for ext in &options.extensions {
        let previous = runtime
            .extension_handler(ext)
            .or_else(|| runtime.extension_handler(".js"));
        let Some(previous) = previous else {
            continue;
        };

        let handler = if bundle {
            bundle_handler(Arc::clone(&compiler), Arc::clone(&include), previous)
        } else {
            file_handler(Arc::clone(&compiler), Arc::clone(&include), previous)
        };

        let prior = runtime.swap_extension_handler(ext, handler);
        patches.push(Patch::Extension {
            runtime: runtime.clone(),
            ext: ext.clone(),
            previous: prior,
        });
    }

    // 2. Stack-trace rewriting
    if runtime.supports_inline_source_maps() {
        let prior = runtime.inline_source_maps_enabled();
        runtime.set_inline_source_maps(true);
        patches.push(Patch::InlineMaps {
            runtime: runtime.clone(),
            previous: prior,
        });
    } else {
        let lookup_registry = Arc::clone(&registry);
        let chained = runtime.frame_formatter();
        let formatter: FrameFormatter = Arc::new(move |frame: &StackFrame| {
            if let Some(map) = lookup_registry.get(&frame.path) {
                if let Some(position) = map.lookup(frame.line, frame.column) {
                    return StackFrame {
                        path: frame.path.clone(),
                        line: position.line,
                        column: position.column,
                    };
                }
            }
            chained(frame)
        });
        let prior = runtime.swap_frame_formatter(formatter);
        patches.push(Patch::FrameFormatter {
            runtime: runtime.clone(),
            previous: prior,
        });
    }

    // 3. Legacy-loader fallback: a plain-script load failing because the
    // file must be an ECMAScript module is recompiled forcing CommonJS and
    // fed to the module's own executor. Everything else rethrows verbatim.
    if let Some(previous_js) = runtime.extension_handler(".js") {
        let fallback_compiler = Arc::clone(&compiler);
        let handler: ExtensionHandler = Arc::new(move |rt, module, path| {
            match previous_js(rt, module, path) {
                Err(RegisterError::RequireEsm { .. }) => {
                    let source = std::fs::read_to_string(path)?;
                    let unit =
                        fallback_compiler.compile(&source, path, Some(ModuleFormat::CommonJs))?;
                    module.compile(rt, &unit.code, unit.format)
                }
                result => result,
            }
        });
        let prior = runtime.swap_extension_handler(".js", handler);
        patches.push(Patch::Extension {
            runtime: runtime.clone(),
            ext: ".js".to_string(),
            previous: prior,
        });
    }

    // 4. Alias resolution, loaded once from the runtime's working
    // directory
    let config = compiler.configs().resolve(&runtime.cwd());
    if let Some(match_path) = MatchPath::from_config(&config) {
        let delegate = runtime.resolver();
        let wrapper: ResolveHook = Arc::new(move |rt, request| {
            if !is_builtin(&request.specifier) {
                if let Some(found) = match_path.resolve(&request.specifier) {
                    let mut redirected = request.clone();
                    redirected.specifier = found.display().to_string();
                    // A failure past this point must still name the
                    // specifier as originally requested
                    return delegate(rt, &redirected).map_err(|err| match err {
                        RegisterError::ModuleNotFound(_) => {
                            RegisterError::ModuleNotFound(request.specifier.clone())
                        }
                        other => other,
                    });
                }
            }
            delegate(rt, request)
        });
        let prior = runtime.swap_resolver(wrapper);
        patches.push(Patch::Resolver {
            runtime: runtime.clone(),
            previous: prior,
        });
    }

    tracing::debug!(
        "hook installed: {} extensions, bundle={}",
        options.extensions.len(),
        bundle
    );

    Ok(Registration {
        patches,
        registry,
        compiler,
    })
}

/// Per-file transform handler for one extension
fn file_handler(
    compiler: Arc<Compiler>,
    include: HookMatcher,
    previous: ExtensionHandler,
) -> ExtensionHandler {
    Arc::new(move |rt, module, path| {
        if !include(path) {
            return previous(rt, module, path);
        }
        let source = std::fs::read_to_string(path)?;
        let unit = compiler.compile(&source, path, None)?;
        execute(rt, module, unit)
    })
}

/// Whole-graph transform handler for one extension
fn bundle_handler(
    compiler: Arc<Compiler>,
    include: HookMatcher,
    previous: ExtensionHandler,
) -> ExtensionHandler {
    Arc::new(move |rt, module, path| {
        if !include(path) {
            return previous(rt, module, path);
        }
        let unit = compiler.bundle(path)?;
        execute(rt, module, unit)
    })
}

/// Hand a compiled unit to the module's executor
fn execute(rt: &Runtime, module: &mut crate::runtime::Module, unit: CompiledUnit) -> Result<()> {
    module.compile(rt, &unit.code, unit.format)
}

/// Effective inclusion predicate for the hook
fn build_matcher(matcher: Option<HookMatcher>, ignore_node_modules: bool) -> HookMatcher {
    match matcher {
        Some(matcher) => matcher,
        None if ignore_node_modules => Arc::new(|path: &Path| {
            !path
                .components()
                .any(|c| c.as_os_str() == "node_modules")
        }),
        None => Arc::new(|_| true),
    }
}

/// Whole-graph mode is on when the option says so, else when the
/// environment variable does
fn bundle_enabled(option: Option<bool>, env: Option<&str>) -> bool {
    option.unwrap_or_else(|| matches!(env, Some("1") | Some("true")))
}
