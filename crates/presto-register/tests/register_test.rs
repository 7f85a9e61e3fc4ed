// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end tests for the transformation hook against the bundled host
//! runtime, using a stub engine that understands a miniature TypeScript
//! dialect: type annotations are stripped and, for CommonJS output,
//! `export` syntax is lowered to `module.exports`.

use presto_register::{
    identity_mappings, register, ModuleFormat, RegisterError, RegisterOptions, Runtime, StackFrame,
    Transform, TransformOptions, TransformOutput, Value,
};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stub engine for the tests: type stripping plus ESM-to-CJS lowering
struct TsStubTransform {
    per_file_called: AtomicBool,
    bundle_called: AtomicBool,
}

impl TsStubTransform {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            per_file_called: AtomicBool::new(false),
            bundle_called: AtomicBool::new(false),
        })
    }
}

impl Transform for TsStubTransform {
    fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> presto_register::Result<TransformOutput> {
        self.per_file_called.store(true, Ordering::Relaxed);
        Ok(lower(source, options))
    }

    fn bundle(
        &self,
        entry: &Path,
        options: &TransformOptions,
    ) -> presto_register::Result<TransformOutput> {
        self.bundle_called.store(true, Ordering::Relaxed);
        let source = fs::read_to_string(entry)?;
        Ok(lower(&source, options))
    }
}

/// The stub's whole transformation: strip annotations, lower exports for
/// CommonJS, prepend the requested banner, emit an identity map shifted by
/// the banner length
fn lower(source: &str, options: &TransformOptions) -> TransformOutput {
    let type_re = Regex::new(r":\s*(?:string|number|boolean|any)\b").unwrap();
    let mut code = type_re.replace_all(source, "").into_owned();

    if options.format == ModuleFormat::CommonJs {
        let default_re = Regex::new(r"(?m)^export\s+default\s+").unwrap();
        code = default_re.replace_all(&code, "module.exports = ").into_owned();
        let export_re = Regex::new(r"(?m)^export\s+").unwrap();
        code = export_re.replace_all(&code, "").into_owned();
    }

    let source_lines = code.lines().count();
    let (code, prologue_lines) = if options.banner.is_empty() {
        (code, 0)
    } else {
        (
            format!("{}\n{}", options.banner, code),
            options.banner.lines().count(),
        )
    };

    let map = serde_json::json!({
        "version": 3,
        "sources": [options.sourcefile.display().to_string()],
        "mappings": identity_mappings(prologue_lines, source_lines),
    });

    TransformOutput {
        code,
        source_map: map.to_string(),
        diagnostics: Vec::new(),
    }
}

fn stub_options(transformer: Arc<TsStubTransform>) -> RegisterOptions {
    RegisterOptions {
        transformer,
        ..RegisterOptions::default()
    }
}

/// Write fixture files relative to a root, creating parent directories
fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let file = root.join(name);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, content).unwrap();
    }
}

#[test]
fn loads_typescript_that_the_pristine_runtime_rejects() {
    let dir = tempfile::tempdir().unwrap();
    write_files(
        dir.path(),
        &[("fixture.ts", "const greeting: string = \"text\";\nexport default greeting;\nmodule.exports = \"text\";")],
    );
    let fixture = dir.path().join("fixture.ts");

    let runtime = Runtime::new();

    // Pristine runtime: .ts falls back to the script handler, which rejects
    // the export syntax
    assert!(matches!(
        runtime.load_file(&fixture).unwrap_err(),
        RegisterError::Syntax(_)
    ));

    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();
    let exports = runtime.load_file(&fixture).unwrap();
    assert_eq!(exports.as_str(), Some("text"));

    // The compile registered a source map for the fixture
    let canonical = fixture.canonicalize().unwrap();
    assert!(registration.registry().get(&canonical).is_some());

    registration.unregister();
}

#[test]
fn nested_requires_compile_reentrantly() {
    let dir = tempfile::tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            (
                "entry.ts",
                "const dep: string = require(\"./dep\");\nmodule.exports = \"entry\";",
            ),
            ("dep.ts", "module.exports = \"dep\";"),
        ],
    );

    let runtime = Runtime::new();
    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();

    let exports = runtime.load_file(&dir.path().join("entry.ts")).unwrap();
    assert_eq!(exports.as_str(), Some("entry"));
    // Both the entry and the transitively loaded dependency were compiled
    assert_eq!(registration.registry().len(), 2);

    registration.unregister();
}

#[test]
fn compiled_output_is_not_recompiled() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("a.ts");
    fs::write(&fixture, "const n: number = 1;\nmodule.exports = 1;").unwrap();

    let runtime = Runtime::new();
    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();

    let source = fs::read_to_string(&fixture).unwrap();
    let unit = registration.compiler().compile(&source, &fixture, None).unwrap();
    let again = registration
        .compiler()
        .compile(&unit.code, &fixture, None)
        .unwrap();

    assert_eq!(again.code, unit.code);
    assert_eq!(
        again.code.matches(presto_register::COMPILE_MARKER).count(),
        1
    );

    registration.unregister();
}

#[test]
fn esm_only_dependency_loads_through_forced_recompilation() {
    let dir = tempfile::tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            ("package.json", r#"{"type": "module"}"#),
            ("dep.js", "export default \"foo\";"),
        ],
    );
    let dep = dir.path().join("dep.js");

    let runtime = Runtime::new();

    // Without the hook the require fails outright
    assert!(matches!(
        runtime.load_file(&dep).unwrap_err(),
        RegisterError::RequireEsm { .. }
    ));

    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();
    let exports = runtime.load_file(&dep).unwrap();
    assert_eq!(exports.as_str(), Some("foo"));

    registration.unregister();

    // Pristine behavior returns after unregistering
    runtime.clear_cache();
    assert!(matches!(
        runtime.load_file(&dep).unwrap_err(),
        RegisterError::RequireEsm { .. }
    ));
}

#[test]
fn alias_specifiers_resolve_through_project_paths() {
    let dir = tempfile::tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            (
                "tsconfig.json",
                r#"{
  "compilerOptions": {
    "baseUrl": "./src",
    "paths": {
      "@apis/*": ["utils/apis/*"]
    }
  }
}"#,
            ),
            ("src/utils/apis/foo.ts", "module.exports = \"foobar\";"),
            ("src/utils/fixture.ts", "module.exports = require(\"@apis/foo\");"),
        ],
    );

    let runtime = Runtime::builder().cwd(dir.path()).build();
    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();

    let parent = dir.path().join("src/utils/fixture.ts");
    let exports = runtime.require("@apis/foo", Some(&parent)).unwrap();
    assert_eq!(exports.as_str(), Some("foobar"));

    // The not-found error names the specifier as requested, not the
    // rewritten candidate
    match runtime.require("@apis/foos", Some(&parent)).unwrap_err() {
        RegisterError::ModuleNotFound(name) => assert_eq!(name, "@apis/foos"),
        other => panic!("unexpected error: {other}"),
    }

    registration.unregister();

    // With the patch reverted the alias means nothing
    match runtime.require("@apis/foo", Some(&parent)).unwrap_err() {
        RegisterError::ModuleNotFound(name) => assert_eq!(name, "@apis/foo"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn stack_frames_map_back_to_original_lines() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("throws.ts");
    fs::write(
        &fixture,
        "const one: number = 1;\nconst two: number = 2;\nmodule.exports = \"mapped\";",
    )
    .unwrap();

    let runtime = Runtime::new();
    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();
    runtime.load_file(&fixture).unwrap();

    let canonical = fixture.canonicalize().unwrap();
    // The marker banner pushed the source down one line: generated line 4
    // is original line 3
    let mapped = runtime.map_frame(&StackFrame {
        path: canonical.clone(),
        line: 4,
        column: 5,
    });
    assert_eq!(mapped.line, 3);
    assert_eq!(mapped.path, canonical);

    // A frame without a registered map keeps its transformed location
    let untouched = runtime.map_frame(&StackFrame {
        path: dir.path().join("other.js"),
        line: 7,
        column: 2,
    });
    assert_eq!(untouched.line, 7);

    let registry = Arc::clone(registration.registry());
    registration.unregister();

    // Uninstall clears the registry and restores the identity formatter
    assert!(registry.is_empty());
    let after = runtime.map_frame(&StackFrame {
        path: canonical,
        line: 4,
        column: 5,
    });
    assert_eq!(after.line, 4);
}

#[test]
fn dependency_directories_are_excluded_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            (
                "node_modules/typed-dep/package.json",
                r#"{"main": "index.ts"}"#,
            ),
            ("node_modules/typed-dep/index.ts", "export default \"dep\";"),
            ("app.js", "module.exports = \"app\";"),
        ],
    );
    let app = dir.path().join("app.js");

    let runtime = Runtime::new();
    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();

    // The dependency is left to the pristine loader, which rejects its
    // export syntax
    assert!(runtime.require("typed-dep", Some(&app)).is_err());

    registration.unregister();
}

#[test]
fn node_modules_compile_when_the_ignore_flag_is_off() {
    let dir = tempfile::tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            (
                "node_modules/typed-dep/package.json",
                r#"{"main": "index.ts"}"#,
            ),
            ("node_modules/typed-dep/index.ts", "export default \"dep\";"),
            ("app.js", "module.exports = \"app\";"),
        ],
    );
    let app = dir.path().join("app.js");

    let runtime = Runtime::new();
    let options = RegisterOptions {
        hook_ignore_node_modules: false,
        ..stub_options(TsStubTransform::new())
    };
    let registration = register(&runtime, options).unwrap();

    let exports = runtime.require("typed-dep", Some(&app)).unwrap();
    assert_eq!(exports.as_str(), Some("dep"));

    registration.unregister();
}

#[test]
fn custom_matcher_decides_inclusion() {
    let dir = tempfile::tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            (
                "node_modules/typed-dep/package.json",
                r#"{"main": "index.ts"}"#,
            ),
            ("node_modules/typed-dep/index.ts", "export default \"dep\";"),
            ("app.js", "module.exports = \"app\";"),
        ],
    );
    let app = dir.path().join("app.js");

    let runtime = Runtime::new();
    let options = RegisterOptions {
        hook_matcher: Some(Arc::new(|path: &Path| {
            path.to_string_lossy().contains("typed-dep")
        })),
        ..stub_options(TsStubTransform::new())
    };
    let registration = register(&runtime, options).unwrap();

    let exports = runtime.require("typed-dep", Some(&app)).unwrap();
    assert_eq!(exports.as_str(), Some("dep"));

    registration.unregister();
}

#[test]
fn bundle_mode_compiles_the_whole_graph() {
    let dir = tempfile::tempdir().unwrap();
    let entry = dir.path().join("entry.ts");
    fs::write(&entry, "const n: number = 3;\nmodule.exports = 3;").unwrap();

    let runtime = Runtime::new();
    let transformer = TsStubTransform::new();
    let options = RegisterOptions {
        bundle: Some(true),
        ..stub_options(Arc::clone(&transformer))
    };
    let registration = register(&runtime, options).unwrap();

    let exports = runtime.load_file(&entry).unwrap();
    assert_eq!(exports, Value::Number(3.0));

    // Whole-graph mode replaces per-file compilation
    assert!(transformer.bundle_called.load(Ordering::Relaxed));
    assert!(!transformer.per_file_called.load(Ordering::Relaxed));

    registration.unregister();
}

#[test]
fn works_without_a_project_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("index.ts");
    fs::write(&fixture, "const hi: string = \"hi\";\nmodule.exports = \"hi\";").unwrap();

    let runtime = Runtime::builder().cwd(dir.path()).build();
    let registration = register(&runtime, stub_options(TsStubTransform::new())).unwrap();

    let exports = runtime.load_file(&fixture).unwrap();
    assert_eq!(exports.as_str(), Some("hi"));

    registration.unregister();
}

/// Exercised paths must survive a full register / unregister / register
/// cycle with a fresh registry each time
#[test]
fn reinstall_starts_from_a_clean_registry() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("a.ts");
    fs::write(&fixture, "module.exports = \"one\";").unwrap();

    let runtime = Runtime::new();

    let first = register(&runtime, stub_options(TsStubTransform::new())).unwrap();
    runtime.load_file(&fixture).unwrap();
    assert_eq!(first.registry().len(), 1);
    first.unregister();

    runtime.clear_cache();
    let second = register(&runtime, stub_options(TsStubTransform::new())).unwrap();
    assert!(second.registry().is_empty());
    runtime.load_file(&fixture).unwrap();
    assert_eq!(second.registry().len(), 1);
    second.unregister();
}
