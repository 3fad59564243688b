//! Command-line arguments for the `decorator-pass` and `line-map` binaries.

use clap::Parser;
use std::path::PathBuf;

use crate::config::GENERATED_SECTION_MARKER;

/// Arguments of the expansion pass.
#[derive(Debug, Parser)]
#[command(
    name = "decorator-pass",
    version,
    about = "Expands decorator(@...) markers in a C++ translation unit into Bind registrations."
)]
pub struct PassArgs {
    /// Translation unit to expand.
    #[arg(long = "in", value_name = "PATH")]
    pub input: PathBuf,

    /// Where to write the expanded translation unit.
    #[arg(long = "out", value_name = "PATH")]
    pub output: PathBuf,

    /// Comma-separated hook modules, run in the given order (e.g. `inject,invoker`).
    #[arg(long, value_name = "NAMES", default_value = "")]
    pub modules: String,

    /// Use the regex boundary scanner instead of the C++ parser.
    /// Fails if any requested module needs parameter signatures.
    #[arg(long)]
    pub boundaries_only: bool,

    /// Also write a JSON summary of markers and generated bindings.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// Arguments of the `#line` mapping tool.
#[derive(Debug, Parser)]
#[command(
    name = "line-map",
    version,
    about = "Adds #line directives so diagnostics map back to the original source."
)]
pub struct LineMapArgs {
    /// Original source file path.
    #[arg(long, value_name = "PATH")]
    pub src: PathBuf,

    /// Decorator-generated input path.
    #[arg(long = "in", value_name = "PATH")]
    pub input: PathBuf,

    /// Mapped output path for compilation.
    #[arg(long = "out", value_name = "PATH")]
    pub output: PathBuf,

    /// Marker before the generated-only tail section.
    #[arg(long, default_value = GENERATED_SECTION_MARKER)]
    pub marker: String,
}
