// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module records and the miniature executor
//!
//! The host's executor understands just enough CommonJS to drive the hook
//! end to end: it rejects module-format code reaching `require`, resolves
//! nested `require("...")` calls synchronously (reentrant loads), and
//! evaluates literal `module.exports = <json>` assignments. Anything richer
//! belongs to a real engine behind the same seam.

use crate::error::{RegisterError, Result};
use crate::format::ModuleFormat;
use crate::runtime::Runtime;
use std::collections::HashMap;
use std::path::PathBuf;

/// A loaded value in the host
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean primitive
    Boolean(bool),
    /// Number primitive
    Number(f64),
    /// String primitive
    String(String),
    /// Plain object
    Object(HashMap<String, Value>),
}

impl Value {
    /// Whether this is `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a parsed JSON value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => {
                let mut obj: HashMap<String, Value> = arr
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), Value::from_json(v)))
                    .collect();
                obj.insert("length".to_string(), Value::Number(arr.len() as f64));
                Value::Object(obj)
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// One module being loaded
#[derive(Debug)]
pub struct Module {
    /// Absolute path of the module file
    pub id: PathBuf,
    /// The module's exports
    pub exports: Value,
    /// Whether the executor has run
    pub loaded: bool,
    /// Code the executor received, kept for inspection
    pub compiled_code: Option<String>,
    /// Dialect of `compiled_code`
    pub format: Option<ModuleFormat>,
}

impl Module {
    /// Create an unloaded module record
    pub fn new(id: PathBuf) -> Self {
        Self {
            id,
            exports: Value::Object(HashMap::new()),
            loaded: false,
            compiled_code: None,
            format: None,
        }
    }

    /// Execute `code` in this module's scope.
    ///
    /// Module-format code cannot run under the synchronous loader and
    /// fails with [`RegisterError::RequireEsm`]; CommonJS code containing
    /// top-level `import`/`export` syntax is a syntax error, exactly as a
    /// real engine would reject it.
    pub fn compile(&mut self, runtime: &Runtime, code: &str, format: ModuleFormat) -> Result<()> {
        if format == ModuleFormat::Esm {
            return Err(RegisterError::RequireEsm {
                path: self.id.clone(),
            });
        }
        if runtime.esm_syntax_re().is_match(code) {
            return Err(RegisterError::syntax(
                "Cannot use import statement outside a module",
            ));
        }

        self.compiled_code = Some(code.to_string());
        self.format = Some(format);

        // Nested requires run reentrantly, before exports are read
        let specifiers: Vec<String> = runtime
            .require_re()
            .captures_iter(code)
            .map(|cap| cap[1].to_string())
            .collect();
        for specifier in specifiers {
            runtime.require(&specifier, Some(&self.id))?;
        }

        // Last parseable assignment wins, like repeated assignments would
        for cap in runtime.exports_re().captures_iter(code) {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(cap[1].trim()) {
                self.exports = Value::from_json(&json);
            }
        }

        self.loaded = true;
        Ok(())
    }
}
