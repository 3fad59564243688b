//! # Hook Modules
//!
//! Hooks enrich the bindings of one run after the resolver has produced them
//! and before the output is assembled. Each hook sees the whole
//! [`GenerationContext`], in configuration order, so later hooks observe what
//! earlier ones wrote.
//!
//! Registry Invariant: the set of hooks is resolved once, from names, before
//! any text is scanned. An unknown name fails the run before it does any work.

mod inject;
mod invoker;

use std::collections::HashMap;
use std::fmt;

use crate::errors::{unspanned, ErrorKind, ErrorReporting, PassError, PhaseContext};
use crate::extract::{normalize_ws, FunctionRecord};
use crate::generate::{Binding, GenerationContext};

pub use inject::{InjectHook, InjectState};
pub use invoker::{InvokerHook, InvokerState};

/// Identity of a hook, used to key its private state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookId {
    Inject,
    Invoker,
}

impl HookId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inject => "inject",
            Self::Invoker => "invoker",
        }
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A module that enriches generated bindings.
pub trait Hook {
    fn id(&self) -> HookId;

    /// Whether the hook needs parameter types and defaults on every record.
    fn requires_signatures(&self) -> bool {
        false
    }

    /// Called once per run. Must be safe to call again on the same context.
    fn handle(&self, ctx: &mut GenerationContext) -> Result<(), PassError> {
        let _ = ctx;
        Ok(())
    }
}

type HookFactory = fn() -> Box<dyn Hook>;

/// Named hook constructors.
pub struct HookRegistry {
    factories: Vec<(&'static str, HookFactory)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Registry with every hook shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("inject", || Box::new(InjectHook::new()));
        registry.register("invoker", || Box::new(InvokerHook::new()));
        registry
    }

    /// Adds or replaces the factory for `name`.
    pub fn register(&mut self, name: &'static str, factory: HookFactory) {
        match self.factories.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = factory,
            None => self.factories.push((name, factory)),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    /// Instantiates the named hooks in the given order.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Box<dyn Hook>>, PassError> {
        names
            .iter()
            .map(|name| {
                self.factories
                    .iter()
                    .find(|(n, _)| *n == name.as_str())
                    .map(|(_, factory)| factory())
                    .ok_or_else(|| self.unknown_module(name))
            })
            .collect()
    }

    fn unknown_module(&self, name: &str) -> PassError {
        PhaseContext::detached("modules")
            .report(
                ErrorKind::ModuleLoad {
                    module: name.to_string(),
                    attempted: "built-in hook registry".to_string(),
                },
                unspanned(),
            )
            .with_help(format!("available modules: {}", self.names().join(", ")))
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// SHARED RECORD SELECTION
// ============================================================================

/// Records grouped by fully-qualified name, each group in source order.
pub fn records_by_fullname(functions: &[FunctionRecord]) -> HashMap<&str, Vec<&FunctionRecord>> {
    let mut groups: HashMap<&str, Vec<&FunctionRecord>> = HashMap::new();
    for record in functions {
        groups.entry(record.fullname.as_str()).or_default().push(record);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|r| r.start);
    }
    groups
}

/// Records whose whitespace-normalized parameter types equal the binding's.
///
/// Empty when the binding carries no signature.
pub fn select_by_signature<'r>(group: &[&'r FunctionRecord], binding: &Binding) -> Vec<&'r FunctionRecord> {
    let Some(wanted) = binding.target_signature.as_ref() else {
        return Vec::new();
    };
    let wanted: Vec<String> = wanted.iter().map(|t| normalize_ws(t)).collect();
    group
        .iter()
        .copied()
        .filter(|record| {
            record
                .signature
                .as_ref()
                .is_some_and(|sig| sig.normalized_types() == wanted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{NodeKind, Signature};

    fn record(fullname: &str, start: usize, types: &[&str]) -> FunctionRecord {
        FunctionRecord {
            name: fullname.rsplit("::").next().unwrap().to_string(),
            fullname: fullname.to_string(),
            start,
            end: start + 1,
            kind: NodeKind::Declaration,
            namespace: Vec::new(),
            signature: Some(Signature {
                param_types: types.iter().map(|t| t.to_string()).collect(),
                ..Signature::default()
            }),
        }
    }

    fn binding(target: &str, types: Option<&[&str]>) -> Binding {
        Binding {
            var_name: "v".into(),
            expr: "inject".into(),
            provenance: "macro".into(),
            target: target.into(),
            target_signature: types.map(|t| t.iter().map(|s| s.to_string()).collect()),
            namespace_scope: String::new(),
            marker_start: 0,
            marker_end: 1,
            statement: String::new(),
            extra_args: Vec::new(),
        }
    }

    #[test]
    fn resolve_keeps_requested_order() {
        let hooks = HookRegistry::builtin()
            .resolve(&["invoker".to_string(), "inject".to_string()])
            .unwrap();
        let ids: Vec<_> = hooks.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![HookId::Invoker, HookId::Inject]);
    }

    #[test]
    fn unknown_module_lists_available_ones() {
        let err = HookRegistry::builtin()
            .resolve(&["inject".to_string(), "tracing".to_string()])
            .err()
            .unwrap();
        assert!(matches!(&err.kind, ErrorKind::ModuleLoad { module, .. } if module == "tracing"));
        assert_eq!(
            err.diagnostic_info.help.as_deref(),
            Some("available modules: inject, invoker")
        );
    }

    #[test]
    fn groups_are_sorted_by_start() {
        let functions = vec![record("ns::f", 30, &[]), record("g", 5, &[]), record("ns::f", 10, &[])];
        let groups = records_by_fullname(&functions);
        let starts: Vec<_> = groups["ns::f"].iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![10, 30]);
    }

    #[test]
    fn selection_ignores_whitespace_in_types() {
        let functions = vec![
            record("f", 0, &["const std::string &"]),
            record("f", 10, &["int"]),
        ];
        let groups = records_by_fullname(&functions);
        let chosen = select_by_signature(&groups["f"], &binding("f", Some(&["const std::string&"])));
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].start, 0);
        assert!(select_by_signature(&groups["f"], &binding("f", None)).is_empty());
    }
}
