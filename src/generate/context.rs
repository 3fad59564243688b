//! State shared between the resolver and hook modules for one run.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::errors::{
    to_source_span, ErrorKind, ErrorReporting, PassError, PhaseContext, SourceContext,
};
use crate::extract::FunctionRecord;
use crate::hooks::HookId;
use crate::scanner::MarkerHit;

/// One generated registration statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub var_name: String,
    pub expr: String,
    pub provenance: String,
    /// Fully-qualified name of the bound function.
    pub target: String,
    /// Declared parameter types of the bound record, when the declaration
    /// source recovers them.
    pub target_signature: Option<Vec<String>>,
    /// Namespace the bound record was declared in, `::`-joined; empty at
    /// global scope. The statement is emitted inside it.
    pub namespace_scope: String,
    /// Byte range of the marker this binding came from.
    pub marker_start: usize,
    pub marker_end: usize,
    /// Hooks may rewrite this.
    pub statement: String,
    /// Spliced into the call parentheses when output is assembled.
    pub extra_args: Vec<String>,
}

impl Binding {
    pub fn target_param_count(&self) -> Option<usize> {
        self.target_signature.as_ref().map(Vec::len)
    }
}

/// Everything a run knows. Created by the pipeline, handed to each hook in turn.
#[derive(Debug)]
pub struct GenerationContext {
    pub source_name: String,
    /// Provenance tag of markers found by this run's scanner.
    pub provenance: String,
    pub text: String,
    pub masked_text: String,
    pub markers: Vec<MarkerHit>,
    pub functions: Vec<FunctionRecord>,
    pub bindings: Vec<Binding>,
    pub prefix_lines: Vec<String>,
    pub suffix_lines: Vec<String>,
    pub module_state: ModuleStates,
}

impl GenerationContext {
    /// Error context for a hook phase, pointing into the original text.
    pub fn phase(&self, phase: &str) -> PhaseContext {
        PhaseContext::new(SourceContext::from_file(&self.source_name, &self.text), phase)
    }

    /// Span of a binding's marker in the original text.
    pub fn binding_span(binding: &Binding) -> miette::SourceSpan {
        to_source_span(binding.marker_start, binding.marker_end)
    }

    /// Error pointing at the marker a binding came from.
    pub fn report_at(&self, phase: &str, kind: ErrorKind, binding: &Binding) -> PassError {
        self.phase(phase).report(kind, Self::binding_span(binding))
    }

    pub fn has_generated_content(&self) -> bool {
        !self.bindings.is_empty() || !self.prefix_lines.is_empty() || !self.suffix_lines.is_empty()
    }
}

/// Per-hook scratch state, keyed by hook and typed by the hook's own struct.
///
/// Lives for one run only, so caches never leak across files.
#[derive(Default)]
pub struct ModuleStates {
    slots: HashMap<HookId, Box<dyn Any>>,
}

impl ModuleStates {
    pub fn get<T: 'static>(&self, id: HookId) -> Option<&T> {
        self.slots.get(&id).and_then(|slot| slot.downcast_ref::<T>())
    }

    /// Returns the hook's state, creating it if missing or of another type.
    pub fn get_or_insert_with<T: 'static>(&mut self, id: HookId, init: impl FnOnce() -> T) -> &mut T {
        let present = self.slots.get(&id).is_some_and(|slot| slot.is::<T>());
        if !present {
            self.slots.insert(id, Box::new(init()));
        }
        self.slots
            .get_mut(&id)
            .and_then(|slot| slot.downcast_mut::<T>())
            .expect("slot holds the requested type after insertion")
    }

    pub fn contains(&self, id: HookId) -> bool {
        self.slots.contains_key(&id)
    }
}

impl fmt::Debug for ModuleStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}
