//! The decorator-pass command-line interface.
//!
//! Both binaries parse their arguments, install a stderr `tracing`
//! subscriber, run, and on failure print the miette report and exit with 1.

use std::fs;
use std::path::Path;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{LineMapArgs, PassArgs};
use crate::config::{parse_module_list, PassConfig};
use crate::errors::{print_error, ErrorReporting, PassError, PhaseContext};
use crate::extract::{BoundaryScanner, DeclarationSource, TreeSitterSource};
use crate::generate::Pipeline;
use crate::line_map::inject_line_map;
use crate::source_file::{read_source, write_source, WriteOutcome};

pub mod args;

/// Logs go to stderr; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Entry point of `decorator-pass`.
pub fn run() {
    let args = PassArgs::parse();
    init_tracing();
    exit_on_error(run_pass(&args));
}

/// Entry point of `line-map`.
pub fn run_line_map() {
    let args = LineMapArgs::parse();
    init_tracing();
    exit_on_error(map_lines(&args));
}

fn exit_on_error(result: Result<(), PassError>) {
    if let Err(error) = result {
        print_error(error);
        process::exit(1);
    }
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

pub fn run_pass(args: &PassArgs) -> Result<(), PassError> {
    let config = PassConfig::default().with_modules(parse_module_list(&args.modules));
    let pipeline = Pipeline::new(config)?;

    let mut source: Box<dyn DeclarationSource> = if args.boundaries_only {
        Box::new(BoundaryScanner::new())
    } else {
        Box::new(TreeSitterSource::new())
    };

    let input = read_source(&args.input)?;
    let source_name = args.input.display().to_string();
    let expansion = pipeline.expand(&input.text, &source_name, source.as_mut())?;

    if let Some(report_path) = &args.report {
        write_report(report_path, &expansion)?;
    }

    match write_source(&args.output, &expansion.output, &input)? {
        WriteOutcome::Written => {
            tracing::info!(out = %args.output.display(), bindings = expansion.context.bindings.len(), "wrote output")
        }
        WriteOutcome::Unchanged => {
            tracing::info!(out = %args.output.display(), "output up to date")
        }
    }
    Ok(())
}

fn write_report(path: &Path, expansion: &crate::generate::Expansion) -> Result<(), PassError> {
    let shown = path.display().to_string();
    let phase = PhaseContext::detached("report");
    let json = serde_json::to_string_pretty(&expansion.report())
        .map_err(|e| phase.io_failure("serialize report for", &shown, e))?;
    fs::write(path, json).map_err(|e| phase.io_failure("write", &shown, e))
}

pub fn map_lines(args: &LineMapArgs) -> Result<(), PassError> {
    let input = read_source(&args.input)?;
    let mapped = inject_line_map(&input.text, &args.src, &args.output, &args.marker);
    write_source(&args.output, &mapped, &input)?;
    Ok(())
}
