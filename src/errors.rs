//! Decorator Pass Error Handling
//!
//! Every failure in the pass is fatal to the run. Errors carry the text they
//! refer to so miette can point at the offending marker or declaration.

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Named text an error points into.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real file content
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("// {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

/// The single error type of the pass
#[derive(Debug)]
pub struct PassError {
    /// What went wrong
    pub kind: ErrorKind,
    /// Where it happened
    pub source_info: SourceInfo,
    /// How to help
    pub diagnostic_info: DiagnosticInfo,
}

/// Every fatal condition the pass can hit
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Marker syntax
    MalformedMarker {
        reason: String,
        argument: String,
    },

    // Binding resolution
    UnresolvableTarget {
        provenance: String,
        expression: String,
        offset: usize,
    },
    UnresolvableSignature {
        target: String,
        signature: Vec<String>,
    },

    // Injection metadata validation
    AmbiguousOverload {
        target: String,
        detail: String,
    },
    ConflictingDefaults {
        target: String,
        index: usize,
    },
    DuplicateMarker {
        samples: Vec<String>,
        remaining: usize,
    },
    UnsupportedNodeKind {
        target: String,
        kind: String,
    },

    // Environment
    ModuleLoad {
        module: String,
        attempted: String,
    },
    ParserUnavailable {
        reason: String,
    },
    InsufficientFidelity {
        module: String,
        source: String,
    },
    Io {
        operation: String,
        path: String,
        reason: String,
    },
}

/// Context-specific source information
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// Context-aware error creation
pub trait ErrorReporting {
    /// Create an error with context-appropriate enhancements
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> PassError;

    fn malformed_marker(&self, reason: &str, argument: &str, span: SourceSpan) -> PassError {
        self.report(
            ErrorKind::MalformedMarker {
                reason: reason.into(),
                argument: argument.into(),
            },
            span,
        )
    }

    fn io_failure(&self, operation: &str, path: &str, reason: impl fmt::Display) -> PassError {
        self.report(
            ErrorKind::Io {
                operation: operation.into(),
                path: path.into(),
                reason: reason.to_string(),
            },
            unspanned(),
        )
    }
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedMarker { .. } => ErrorCategory::Syntax,

            Self::UnresolvableTarget { .. } | Self::UnresolvableSignature { .. } => {
                ErrorCategory::Resolution
            }

            Self::AmbiguousOverload { .. }
            | Self::ConflictingDefaults { .. }
            | Self::DuplicateMarker { .. }
            | Self::UnsupportedNodeKind { .. } => ErrorCategory::Validation,

            Self::ModuleLoad { .. }
            | Self::ParserUnavailable { .. }
            | Self::InsufficientFidelity { .. }
            | Self::Io { .. } => ErrorCategory::Environment,
        }
    }

    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::MalformedMarker { .. } => "malformed_marker",
            Self::UnresolvableTarget { .. } => "unresolvable_target",
            Self::UnresolvableSignature { .. } => "unresolvable_signature",
            Self::AmbiguousOverload { .. } => "ambiguous_overload",
            Self::ConflictingDefaults { .. } => "conflicting_defaults",
            Self::DuplicateMarker { .. } => "duplicate_marker",
            Self::UnsupportedNodeKind { .. } => "unsupported_node_kind",
            Self::ModuleLoad { .. } => "module_load",
            Self::ParserUnavailable { .. } => "parser_unavailable",
            Self::InsufficientFidelity { .. } => "insufficient_fidelity",
            Self::Io { .. } => "io",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Resolution,
    Validation,
    Environment,
}

impl std::error::Error for PassError {}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::MalformedMarker { reason, argument } => {
                write!(f, "Marker error: {} (argument {:?})", reason, argument)
            }
            ErrorKind::UnresolvableTarget {
                provenance,
                expression,
                offset,
            } => {
                write!(
                    f,
                    "Resolution error: cannot find target function for decorator marker ({}:{}) near byte {}",
                    provenance, expression, offset
                )
            }
            ErrorKind::UnresolvableSignature { target, signature } => {
                write!(
                    f,
                    "Resolution error: inject target signature cannot be resolved: '{}' with signature ({})",
                    target,
                    signature.join(", ")
                )
            }
            ErrorKind::AmbiguousOverload { target, detail } => {
                write!(
                    f,
                    "Validation error: inject target has ambiguous overload set ({}) for '{}'",
                    detail, target
                )
            }
            ErrorKind::ConflictingDefaults { target, index } => {
                write!(
                    f,
                    "Validation error: inject target has conflicting default expressions between declaration/definition for '{}', param #{}",
                    target, index
                )
            }
            ErrorKind::DuplicateMarker { samples, remaining } => {
                write!(
                    f,
                    "Validation error: duplicate @inject decorator is not allowed for the same target/signature: {}",
                    samples.join(", ")
                )?;
                if *remaining > 0 {
                    write!(f, " (and {} more)", remaining)?;
                }
                Ok(())
            }
            ErrorKind::UnsupportedNodeKind { target, kind } => {
                write!(
                    f,
                    "Validation error: inject target '{}' resolved unsupported node type '{}'",
                    target, kind
                )
            }
            ErrorKind::ModuleLoad { module, attempted } => {
                write!(
                    f,
                    "Module error: decorator module '{}' not found ({})",
                    module, attempted
                )
            }
            ErrorKind::ParserUnavailable { reason } => {
                write!(f, "Parser error: C++ parser is unavailable: {}", reason)
            }
            ErrorKind::InsufficientFidelity { module, source } => {
                write!(
                    f,
                    "Configuration error: module '{}' needs parameter signatures, but the {} declaration source does not provide them",
                    module, source
                )
            }
            ErrorKind::Io {
                operation,
                path,
                reason,
            } => {
                write!(f, "I/O error: failed to {} '{}': {}", operation, path, reason)
            }
        }
    }
}

impl Diagnostic for PassError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display + 'a>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl PassError {
    fn primary_label(&self) -> String {
        match &self.kind {
            ErrorKind::MalformedMarker { .. } => "malformed marker".into(),
            ErrorKind::UnresolvableTarget { .. } => "no function follows this marker".into(),
            ErrorKind::UnresolvableSignature { .. } => "signature not found".into(),
            ErrorKind::AmbiguousOverload { .. } => "ambiguous overload".into(),
            ErrorKind::ConflictingDefaults { .. } => "conflicting default".into(),
            ErrorKind::DuplicateMarker { .. } => "duplicate marker".into(),
            ErrorKind::UnsupportedNodeKind { .. } => "unsupported node".into(),
            ErrorKind::ModuleLoad { .. } => "unknown module".into(),
            ErrorKind::ParserUnavailable { .. } => "parser unavailable".into(),
            ErrorKind::InsufficientFidelity { .. } => "insufficient fidelity".into(),
            ErrorKind::Io { .. } => "i/o failure".into(),
        }
    }

    /// Attach a help message to an already-built error.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.diagnostic_info.help = Some(help.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

/// Creates a placeholder span for errors not tied to a specific source code
/// location, such as I/O errors or module resolution failures.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

/// Converts a half-open byte range into a miette span.
pub fn to_source_span(start: usize, end: usize) -> SourceSpan {
    SourceSpan::from(start..end.max(start))
}

/// General-purpose error creation context: one per pipeline phase.
pub struct PhaseContext {
    pub source: SourceContext,
    pub phase: String,
}

impl PhaseContext {
    pub fn new(source: SourceContext, phase: impl Into<String>) -> Self {
        Self {
            source,
            phase: phase.into(),
        }
    }

    /// A context with no meaningful source text, for environment failures.
    pub fn detached(phase: &str) -> Self {
        Self::new(SourceContext::fallback(phase), phase)
    }
}

impl ErrorReporting for PhaseContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> PassError {
        let error_code = format!("decorator::{}::{}", self.phase, kind.code_suffix());

        PassError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: self.phase.clone(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

// ============================================================================
// ERROR FORMATTING UTILITIES
// ============================================================================

/// Prints a PassError with full miette diagnostics
pub fn print_error(error: PassError) {
    use miette::Report;
    let report = Report::new(error);
    eprintln!("{report:?}");
}
