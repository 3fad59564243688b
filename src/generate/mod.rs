//! # Generation Pipeline
//!
//! One run of the pass over one translation unit:
//!
//! 1. scan the raw text for markers
//! 2. mask every marker range, keeping byte offsets and newlines
//! 3. extract function-like records from the masked text
//! 4. bind each marker to the nearest following record
//! 5. run the hook modules in order
//! 6. append the generated section to the masked text
//!
//! Nothing is written anywhere until every step has succeeded.

mod context;
mod resolve;

use serde::Serialize;

use crate::config::PassConfig;
use crate::errors::{
    to_source_span, unspanned, ErrorKind, ErrorReporting, PassError, PhaseContext, SourceContext,
};
use crate::extract::{DeclarationSource, Fidelity};
use crate::hooks::{Hook, HookRegistry};
use crate::scanner::MarkerScanner;

pub use context::{Binding, GenerationContext, ModuleStates};
pub use resolve::{
    assemble_output, bind_marker, binding_var_name, find_nearest_function, mask_ranges_keep_layout,
    render_statement, splice_extra_args,
};

/// Output text plus the state it was built from.
#[derive(Debug)]
pub struct Expansion {
    pub output: String,
    pub context: GenerationContext,
}

impl Expansion {
    /// Serializable summary of the run.
    pub fn report(&self) -> ExpansionReport<'_> {
        ExpansionReport {
            source: &self.context.source_name,
            markers: self.context.markers.len(),
            functions: self.context.functions.len(),
            bindings: &self.context.bindings,
            prefix_lines: &self.context.prefix_lines,
            suffix_lines: &self.context.suffix_lines,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpansionReport<'a> {
    pub source: &'a str,
    pub markers: usize,
    pub functions: usize,
    pub bindings: &'a [Binding],
    pub prefix_lines: &'a [String],
    pub suffix_lines: &'a [String],
}

/// A configured pass: marker syntax plus the resolved hook chain.
pub struct Pipeline {
    config: PassConfig,
    hooks: Vec<Box<dyn Hook>>,
}

impl Pipeline {
    /// Resolves `config.modules` against the built-in hooks.
    pub fn new(config: PassConfig) -> Result<Self, PassError> {
        let hooks = HookRegistry::builtin().resolve(&config.modules)?;
        Ok(Self { config, hooks })
    }

    /// Uses an explicit hook chain instead of resolving `config.modules`.
    pub fn with_hooks(config: PassConfig, hooks: Vec<Box<dyn Hook>>) -> Self {
        Self { config, hooks }
    }

    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    pub fn expand(
        &self,
        text: &str,
        source_name: &str,
        source: &mut dyn DeclarationSource,
    ) -> Result<Expansion, PassError> {
        self.check_fidelity(source)?;

        let source_ctx = SourceContext::from_file(source_name, text);
        let markers = MarkerScanner::new(&self.config).scan(&source_ctx)?;

        let ranges: Vec<(usize, usize)> = markers.iter().map(|m| (m.start, m.end)).collect();
        let masked_text = mask_ranges_keep_layout(text, &ranges);

        let functions = if markers.is_empty() {
            Vec::new()
        } else {
            source.extract(&masked_text)?
        };

        let resolve_ctx = PhaseContext::new(source_ctx, "resolve");
        let mut bindings = Vec::with_capacity(markers.len());
        for (ordinal, marker) in markers.iter().enumerate() {
            let Some(function) = find_nearest_function(&functions, marker.end) else {
                let kind = ErrorKind::UnresolvableTarget {
                    provenance: marker.provenance.clone(),
                    expression: marker.expression.clone(),
                    offset: marker.start,
                };
                return Err(resolve_ctx
                    .report(kind, to_source_span(marker.start, marker.end))
                    .with_help("a decorator marker must be followed by the function it decorates"));
            };
            let binding = bind_marker(marker, ordinal, function);
            tracing::info!(
                var = %binding.var_name,
                function = %binding.target,
                expr = %binding.expr,
                "bind"
            );
            bindings.push(binding);
        }

        let mut ctx = GenerationContext {
            source_name: source_name.to_string(),
            provenance: self.config.provenance.clone(),
            text: text.to_string(),
            masked_text,
            markers,
            functions,
            bindings,
            prefix_lines: Vec::new(),
            suffix_lines: Vec::new(),
            module_state: ModuleStates::default(),
        };

        for hook in &self.hooks {
            tracing::info!(module = %hook.id(), "running decorator module");
            hook.handle(&mut ctx)?;
        }

        let output = assemble_output(&ctx, &self.config.section_marker);
        Ok(Expansion {
            output,
            context: ctx,
        })
    }

    fn check_fidelity(&self, source: &dyn DeclarationSource) -> Result<(), PassError> {
        if source.fidelity() == Fidelity::Signatures {
            return Ok(());
        }
        match self.hooks.iter().find(|hook| hook.requires_signatures()) {
            Some(hook) => Err(PhaseContext::detached("modules")
                .report(
                    ErrorKind::InsufficientFidelity {
                        module: hook.id().to_string(),
                        source: source.name().to_string(),
                    },
                    unspanned(),
                )
                .with_help("drop --boundaries-only or remove the module from --modules")),
            None => Ok(()),
        }
    }
}
