// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Minimal embeddable host runtime
//!
//! Stands in for the native module loader the hook patches: an
//! extension-handler dispatch table, a swappable resolution primitive, a
//! stack-frame formatter, and a module cache with a loading stack for
//! require cycles. Every slot the hook touches is explicit, so a richer
//! engine exposing the same seams can replace this host wholesale.

mod module;
mod resolver;

pub use module::{Module, Value};
pub use resolver::{
    is_builtin, native_resolve, ResolveHook, ResolveRequest, Resolved, BUILTIN_MODULES,
};

use crate::error::Result;
use crate::format::infer_format;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handler executing one file class: `(runtime, module, filename)`
pub type ExtensionHandler = Arc<dyn Fn(&Runtime, &mut Module, &Path) -> Result<()> + Send + Sync>;

/// One stack-trace frame location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// File the frame points into
    pub path: PathBuf,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

/// Rewrites frame locations during error formatting
pub type FrameFormatter = Arc<dyn Fn(&StackFrame) -> StackFrame + Send + Sync>;

/// Shared host state behind the [`Runtime`] handle
struct RuntimeState {
    handlers: RwLock<HashMap<String, ExtensionHandler>>,
    /// Ordered extension list consulted by resolution probing
    extensions: RwLock<Vec<String>>,
    resolver: RwLock<ResolveHook>,
    frame_formatter: RwLock<FrameFormatter>,
    exports_cache: DashMap<PathBuf, Value>,
    /// Stack of currently loading modules, for require cycles
    loading: Mutex<Vec<PathBuf>>,
    version: (u32, u32),
    native_inline_maps: bool,
    inline_maps_enabled: AtomicBool,
    cwd: PathBuf,
    require_re: Regex,
    exports_re: Regex,
    esm_syntax_re: Regex,
}

/// Handle to the host runtime; clones share state
#[derive(Clone)]
pub struct Runtime {
    state: Arc<RuntimeState>,
}

/// Configures a [`Runtime`] before construction
pub struct RuntimeBuilder {
    version: (u32, u32),
    cwd: Option<PathBuf>,
    native_inline_maps: bool,
}

impl RuntimeBuilder {
    /// Emulated host version, used for target defaults and legacy rewrites
    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.version = (major, minor);
        self
    }

    /// Working directory alias configuration is loaded from
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Whether the host natively consumes inline source maps
    pub fn native_inline_source_maps(mut self, enabled: bool) -> Self {
        self.native_inline_maps = enabled;
        self
    }

    /// Build the runtime with default handlers installed
    pub fn build(self) -> Runtime {
        let cwd = self
            .cwd
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let state = Arc::new(RuntimeState {
            handlers: RwLock::new(HashMap::new()),
            extensions: RwLock::new(vec![".js".to_string(), ".json".to_string()]),
            resolver: RwLock::new(Arc::new(native_resolve)),
            frame_formatter: RwLock::new(Arc::new(|frame: &StackFrame| frame.clone())),
            exports_cache: DashMap::new(),
            loading: Mutex::new(Vec::new()),
            version: self.version,
            native_inline_maps: self.native_inline_maps,
            inline_maps_enabled: AtomicBool::new(false),
            cwd,
            require_re: Regex::new(r#"require\(\s*"([^"]+)"\s*\)"#).expect("static pattern"),
            exports_re: Regex::new(r"(?m)^\s*module\.exports\s*=\s*(.+?);?\s*$")
                .expect("static pattern"),
            esm_syntax_re: Regex::new(r"(?m)^\s*(?:import|export)\s").expect("static pattern"),
        });

        let runtime = Runtime { state };
        runtime.install_default_handlers();
        runtime
    }
}

impl Runtime {
    /// Runtime with default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a runtime
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder {
            version: (20, 11),
            cwd: None,
            native_inline_maps: false,
        }
    }

    fn install_default_handlers(&self) {
        let mut handlers = self.state.handlers.write();
        handlers.insert(".js".to_string(), Arc::new(script_handler));
        handlers.insert(".json".to_string(), Arc::new(json_handler));
    }

    /// Emulated host version
    pub fn version(&self) -> (u32, u32) {
        self.state.version
    }

    /// Working directory for install-time configuration loading
    pub fn cwd(&self) -> PathBuf {
        self.state.cwd.clone()
    }

    /// Load a module by specifier, through the active resolution primitive
    pub fn require(&self, specifier: &str, parent: Option<&Path>) -> Result<Value> {
        match self.resolve(specifier, parent)? {
            Resolved::Builtin(name) => Ok(Value::String(format!("__builtin__:{name}"))),
            Resolved::Path(path) => self.load_file(&path),
        }
    }

    /// Resolve a specifier without loading
    pub fn resolve(&self, specifier: &str, parent: Option<&Path>) -> Result<Resolved> {
        let request = ResolveRequest {
            specifier: specifier.to_string(),
            parent: parent.map(Path::to_path_buf),
            is_main: false,
        };
        let hook = Arc::clone(&*self.state.resolver.read());
        hook(self, &request)
    }

    /// Load a file through its extension handler.
    ///
    /// Repeat loads are served from the exports cache; a load already on
    /// the loading stack returns its partial (empty) exports, which is how
    /// require cycles terminate.
    pub fn load_file(&self, path: &Path) -> Result<Value> {
        let abs = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(cached) = self.state.exports_cache.get(&abs) {
            return Ok(cached.clone());
        }
        if self.state.loading.lock().contains(&abs) {
            return Ok(Value::Object(HashMap::new()));
        }

        let handler = self.handler_for(&abs);
        self.state.loading.lock().push(abs.clone());
        let mut module = Module::new(abs.clone());
        let result = handler(self, &mut module, &abs);
        self.state.loading.lock().pop();

        result.map(|()| {
            let exports = module.exports.clone();
            self.state.exports_cache.insert(abs, module.exports);
            exports
        })
    }

    /// Handler for a path's extension; unknown extensions fall back to the
    /// script handler
    fn handler_for(&self, path: &Path) -> ExtensionHandler {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let handlers = self.state.handlers.read();
        handlers
            .get(&ext)
            .or_else(|| handlers.get(".js"))
            .map(Arc::clone)
            .expect("script handler always installed")
    }

    /// Currently installed handler for an extension
    pub fn extension_handler(&self, ext: &str) -> Option<ExtensionHandler> {
        self.state.handlers.read().get(ext).map(Arc::clone)
    }

    /// Install a handler for an extension, returning the previous one
    pub fn swap_extension_handler(
        &self,
        ext: &str,
        handler: ExtensionHandler,
    ) -> Option<ExtensionHandler> {
        let previous = self
            .state
            .handlers
            .write()
            .insert(ext.to_string(), handler);
        if previous.is_none() {
            self.state.extensions.write().push(ext.to_string());
        }
        previous
    }

    /// Remove an extension handler, returning it
    pub fn remove_extension_handler(&self, ext: &str) -> Option<ExtensionHandler> {
        let removed = self.state.handlers.write().remove(ext);
        if removed.is_some() {
            self.state.extensions.write().retain(|e| e != ext);
        }
        removed
    }

    /// Ordered extension list used for resolution probing
    pub fn resolution_extensions(&self) -> Vec<String> {
        self.state.extensions.read().clone()
    }

    /// The active resolution primitive
    pub fn resolver(&self) -> ResolveHook {
        Arc::clone(&*self.state.resolver.read())
    }

    /// Swap the resolution primitive, returning the previous one
    pub fn swap_resolver(&self, hook: ResolveHook) -> ResolveHook {
        std::mem::replace(&mut *self.state.resolver.write(), hook)
    }

    /// The active stack-frame formatter
    pub fn frame_formatter(&self) -> FrameFormatter {
        Arc::clone(&*self.state.frame_formatter.read())
    }

    /// Swap the stack-frame formatter, returning the previous one
    pub fn swap_frame_formatter(&self, formatter: FrameFormatter) -> FrameFormatter {
        std::mem::replace(&mut *self.state.frame_formatter.write(), formatter)
    }

    /// Run a frame through the active formatter (the error-reporting path)
    pub fn map_frame(&self, frame: &StackFrame) -> StackFrame {
        let formatter = Arc::clone(&*self.state.frame_formatter.read());
        formatter(frame)
    }

    /// Whether the host can consume inline source maps natively
    pub fn supports_inline_source_maps(&self) -> bool {
        self.state.native_inline_maps
    }

    /// Toggle native inline source-map consumption
    pub fn set_inline_source_maps(&self, enabled: bool) {
        self.state.inline_maps_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether native inline source-map consumption is on
    pub fn inline_source_maps_enabled(&self) -> bool {
        self.state.inline_maps_enabled.load(Ordering::Relaxed)
    }

    /// Drop all cached module exports
    pub fn clear_cache(&self) {
        self.state.exports_cache.clear();
    }

    pub(crate) fn require_re(&self) -> &Regex {
        &self.state.require_re
    }

    pub(crate) fn exports_re(&self) -> &Regex {
        &self.state.exports_re
    }

    pub(crate) fn esm_syntax_re(&self) -> &Regex {
        &self.state.esm_syntax_re
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Default script handler: read the file and hand it to the executor in
/// its inferred format
fn script_handler(runtime: &Runtime, module: &mut Module, path: &Path) -> Result<()> {
    let source = std::fs::read_to_string(path)?;
    let dir = path.parent().unwrap_or(Path::new("."));
    let format = infer_format(dir, path);
    module.compile(runtime, &source, format)
}

/// Default JSON handler
fn json_handler(_runtime: &Runtime, module: &mut Module, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    module.exports = Value::from_json(&json);
    module.loaded = true;
    Ok(())
}
