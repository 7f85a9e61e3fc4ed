// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Presto - run typed, JSX-capable source files as if natively supported
//!
//! This is the main entry point for the presto CLI: it installs the
//! transformation hook on the bundled host runtime and executes the given
//! script file.

use clap::Parser;
use owo_colors::OwoColorize;
use presto_register::{register, RegisterOptions, Runtime};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// presto - execute typed, JSX-capable source files directly
#[derive(Parser, Debug)]
#[command(name = "presto")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script file to execute
    file: PathBuf,

    /// Compile the whole module graph instead of per-file
    #[arg(long)]
    bundle: bool,

    /// Inline JSON object with transform overrides
    /// (jsxFactory, jsxFragmentFactory, target)
    #[arg(long, value_name = "JSON")]
    transform_config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        println!(
            "{} v{}",
            "presto".bright_cyan().bold(),
            env!("CARGO_PKG_VERSION").yellow()
        );
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Install the hook, execute the file, and tear the hook back down
fn run(cli: &Cli) -> anyhow::Result<()> {
    if !cli.file.exists() {
        anyhow::bail!("file not found '{}'", cli.file.display());
    }

    let mut options = RegisterOptions::default();
    if cli.bundle {
        options.bundle = Some(true);
    }
    if let Some(raw) = &cli.transform_config {
        apply_transform_config(&mut options, raw);
    }

    let runtime = Runtime::new();
    let registration = register(&runtime, options)?;
    tracing::debug!("hook installed, executing {}", cli.file.display());
    let result = runtime.load_file(&cli.file);
    registration.unregister();

    result?;
    Ok(())
}

/// Merge an inline JSON config over the default options. Anything that is
/// not a JSON object is ignored with a notice.
fn apply_transform_config(options: &mut RegisterOptions, raw: &str) {
    let parsed: Result<serde_json::Value, _> = serde_json::from_str(raw);
    match parsed {
        Ok(serde_json::Value::Object(map)) => {
            if let Some(v) = map.get("jsxFactory").and_then(|v| v.as_str()) {
                options.jsx_factory = Some(v.to_string());
            }
            if let Some(v) = map.get("jsxFragmentFactory").and_then(|v| v.as_str()) {
                options.jsx_fragment = Some(v.to_string());
            }
            if let Some(v) = map.get("target").and_then(|v| v.as_str()) {
                options.target = Some(v.to_string());
            }
            if let Some(v) = map.get("bundle").and_then(|v| v.as_bool()) {
                options.bundle = Some(v);
            }
        }
        _ => {
            eprintln!(
                "{}: transform config is not a JSON object, ignoring",
                "Warning".yellow().bold()
            );
        }
    }
}
