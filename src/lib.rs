//! Source-to-source expansion of `decorator(@expr)` markers in C++.
//!
//! The pass blanks every marker in place, resolves the function each marker
//! annotates, and appends one `Bind` registration per marker after a
//! generated-section comment. Hook modules (`inject`, `invoker`) enrich those
//! registrations before the output is assembled.

pub use crate::config::PassConfig;
pub use crate::errors::{print_error, ErrorKind, PassError};
pub use crate::extract::{BoundaryScanner, DeclarationSource, Fidelity, FunctionRecord, TreeSitterSource};
pub use crate::generate::{Binding, Expansion, GenerationContext, Pipeline};
pub use crate::hooks::{Hook, HookId, HookRegistry};
pub use crate::scanner::{MarkerHit, MarkerScanner};

pub mod cli;
pub mod config;
pub mod errors;
pub mod extract;
pub mod generate;
pub mod hooks;
pub mod line_map;
pub mod scanner;
pub mod source_file;
