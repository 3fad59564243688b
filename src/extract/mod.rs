//! Declaration extraction.
//!
//! A [`DeclarationSource`] turns masked C++ text into a flat list of
//! [`FunctionRecord`]s. Two sources exist:
//!
//! - [`TreeSitterSource`] parses with tree-sitter and recovers fully-qualified
//!   names, parameter types and default arguments.
//! - [`BoundaryScanner`] is a regex scan that only knows names and byte
//!   ranges. It never claims signature fidelity, so the pipeline refuses to
//!   run signature-dependent hooks on top of it.

mod boundary;
mod tree;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::PassError;

pub use boundary::BoundaryScanner;
pub use tree::{CppParser, TreeSitterSource};

/// What a declaration source can promise about its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fidelity {
    /// Names, ranges, parameter types and defaults.
    Signatures,
    /// Names and ranges only.
    BoundariesOnly,
}

/// Produces function-like records from masked source text.
pub trait DeclarationSource {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    fn fidelity(&self) -> Fidelity;

    fn extract(&mut self, masked: &str) -> Result<Vec<FunctionRecord>, PassError>;
}

/// Syntax node kind a record was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    FunctionDefinition,
    Declaration,
    FieldDeclaration,
    /// Found by the boundary scanner; the real node kind is unknown.
    Scanned,
}

impl NodeKind {
    pub fn from_tree_sitter(kind: &str) -> Option<Self> {
        match kind {
            "function_definition" => Some(Self::FunctionDefinition),
            "declaration" => Some(Self::Declaration),
            "field_declaration" => Some(Self::FieldDeclaration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FunctionDefinition => "function_definition",
            Self::Declaration => "declaration",
            Self::FieldDeclaration => "field_declaration",
            Self::Scanned => "scanned_boundary",
        }
    }

    /// Kinds the injection metadata resolver knows how to handle.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Scanned)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter with a default argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDefault {
    pub param_type: String,
    /// Right-hand side of `=`, verbatim apart from outer trimming.
    pub default_expr: String,
}

/// Parameter list of one function-like node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Signature {
    /// Declared types in order; `"..."` for a C-style variadic.
    pub param_types: Vec<String>,
    /// Sparse: parameter index to its default.
    pub defaults: BTreeMap<usize, ParamDefault>,
}

impl Signature {
    pub fn param_count(&self) -> usize {
        self.param_types.len()
    }

    /// Types with all whitespace removed, for comparisons.
    pub fn normalized_types(&self) -> Vec<String> {
        self.param_types.iter().map(|t| normalize_ws(t)).collect()
    }
}

/// One function definition, declaration or member declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionRecord {
    pub name: String,
    /// Never starts with `::`.
    pub fullname: String,
    pub start: usize,
    pub end: usize,
    pub kind: NodeKind,
    /// Enclosing named namespaces, outermost first. Classes are not included,
    /// so `fullname` minus this prefix still carries any class qualification.
    pub namespace: Vec<String>,
    /// `None` when the source could not recover parameters.
    pub signature: Option<Signature>,
}

impl FunctionRecord {
    pub fn param_count(&self) -> Option<usize> {
        self.signature.as_ref().map(Signature::param_count)
    }
}

// ============================================================================
// TEXT HELPERS
// ============================================================================

static TRAILING_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_]\w*\s*$").expect("static regex"));

/// Removes every whitespace character.
pub fn normalize_ws(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Strips the parameter name from the text left of `=` (or a whole
/// parameter declaration).
///
/// When what remains ends in `::` the trailing identifier was part of a
/// qualified type name, so the whole text is the type.
pub fn extract_param_type(lhs: &str) -> String {
    let s = lhs.trim();
    let Some(m) = TRAILING_IDENT.find(s) else {
        return s.to_string();
    };
    let prefix = s[..m.start()].trim_end();
    if prefix.is_empty() || prefix.ends_with("::") {
        return s.to_string();
    }
    prefix.to_string()
}

/// Merges a lexical scope chain with the qualification already present on
/// a declarator, dropping the longest suffix of `scope` that equals a prefix
/// of `qualified`.
pub fn merge_scope_with_qualified(scope: &[String], qualified: &[String]) -> Vec<String> {
    let max_k = scope.len().min(qualified.len());
    let overlap = (0..=max_k)
        .rev()
        .find(|&k| scope[scope.len() - k..] == qualified[..k])
        .unwrap_or(0);
    scope[..scope.len() - overlap]
        .iter()
        .chain(qualified.iter())
        .cloned()
        .collect()
}
