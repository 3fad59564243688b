//! Default-call invokers for free functions whose parameters all have defaults.

use std::collections::HashSet;

use super::{records_by_fullname, select_by_signature, Hook, HookId};
use crate::errors::PassError;
use crate::extract::FunctionRecord;
use crate::generate::{Binding, GenerationContext};

#[derive(Debug, Default)]
pub struct InvokerState {
    /// Bindings that already received an invoker.
    pub invoked: HashSet<String>,
}

/// Appends `[]() { return ::target(); }` to bindings of callable-without-arguments
/// free functions. Anything else is skipped silently.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvokerHook;

impl InvokerHook {
    pub fn new() -> Self {
        Self
    }
}

impl Hook for InvokerHook {
    fn id(&self) -> HookId {
        HookId::Invoker
    }

    fn requires_signatures(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &mut GenerationContext) -> Result<(), PassError> {
        let done = ctx
            .module_state
            .get::<InvokerState>(HookId::Invoker)
            .map(|state| state.invoked.clone())
            .unwrap_or_default();

        let groups = records_by_fullname(&ctx.functions);
        let mut additions: Vec<(usize, String)> = Vec::new();

        for (index, binding) in ctx.bindings.iter().enumerate() {
            if done.contains(&binding.var_name) || is_member_like(binding) {
                continue;
            }
            let Some(group) = groups.get(binding.target.as_str()) else {
                continue;
            };
            let selected = select_by_signature(group, binding);
            if selected.is_empty() {
                continue;
            }
            let param_count = binding.target_param_count().unwrap_or(0);
            if !all_defaulted(&selected, param_count) {
                continue;
            }
            additions.push((index, invoker_expression(&binding.target)));
        }

        let state = ctx
            .module_state
            .get_or_insert_with(HookId::Invoker, InvokerState::default);
        for (index, expression) in additions {
            let binding = &mut ctx.bindings[index];
            tracing::info!(function = %binding.target, "invoker: bind-invoker");
            binding.extra_args.push(expression);
            state.invoked.insert(binding.var_name.clone());
        }
        Ok(())
    }
}

/// The target is still qualified once its enclosing namespace is removed,
/// so it names a class member whether or not the class is visible here.
fn is_member_like(binding: &Binding) -> bool {
    let target = binding.target.trim().trim_start_matches(':');
    let scope = binding.namespace_scope.trim();
    let local = if scope.is_empty() {
        target
    } else {
        target
            .strip_prefix(scope)
            .and_then(|rest| rest.strip_prefix("::"))
            .unwrap_or(target)
    };
    local.contains("::")
}

fn invoker_expression(target: &str) -> String {
    let target = target.trim();
    if target.starts_with("::") {
        format!("[]() {{ return {}(); }}", target)
    } else {
        format!("[]() {{ return ::{}(); }}", target)
    }
}

/// Every index below `param_count` has a default on at least one record.
fn all_defaulted(records: &[&FunctionRecord], param_count: usize) -> bool {
    let defaulted: HashSet<usize> = records
        .iter()
        .filter_map(|r| r.signature.as_ref())
        .flat_map(|sig| sig.defaults.keys().copied())
        .collect();
    (0..param_count).all(|i| defaulted.contains(&i))
}
