//! Dependency-injection metadata for `decorator(@inject)` targets.
//!
//! For every injection binding the hook validates the target's overload set,
//! merges default arguments across its declarations and appends one
//! `InjectArgMeta` argument per `Depends(...)` default.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use super::{records_by_fullname, select_by_signature, Hook, HookId};
use crate::errors::{ErrorKind, PassError};
use crate::extract::{normalize_ws, FunctionRecord, ParamDefault};
use crate::generate::{Binding, GenerationContext};

static INJECT_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:::)?(?:[A-Za-z_]\w*::)*inject$").expect("static regex"));

static DEPENDS_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:::)?(?:[A-Za-z_]\w*::)*Depends\(.*\)$").expect("static regex"));

const METADATA_NAMESPACE: &str = "::cpp::blackmagic::depends";
const MAX_DUPLICATE_SAMPLES: usize = 3;
const PHASE: &str = "inject";

/// (target, normalized parameter types). `None` types mark a binding built
/// without signature information.
type BindingKey = (String, Option<Vec<String>>);

fn binding_key(binding: &Binding) -> BindingKey {
    let types = binding
        .target_signature
        .as_ref()
        .map(|types| types.iter().map(|t| normalize_ws(t)).collect());
    (binding.target.clone(), types)
}

fn display_signature(binding: &Binding) -> String {
    let types = binding.target_signature.as_deref().unwrap_or_default();
    format!("{}({})", binding.target, types.join(", "))
}

pub fn is_inject_expression(expr: &str) -> bool {
    INJECT_EXPR.is_match(&normalize_ws(expr))
}

pub fn is_depends_default(expr: &str) -> bool {
    DEPENDS_EXPR.is_match(&normalize_ws(expr))
}

fn is_inject_binding(binding: &Binding, provenance: &str) -> bool {
    binding.provenance == provenance && is_inject_expression(&binding.expr)
}

fn fresh_alias() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("_{:06x}", value)
}

/// Per-run cache of the inject hook.
#[derive(Debug, Default)]
pub struct InjectState {
    /// Merged defaults per binding key; built and validated once.
    pub defaults: Option<HashMap<BindingKey, Vec<(usize, ParamDefault)>>>,
    pub alias: Option<String>,
    pub alias_emitted: bool,
    /// Variable names of bindings that already carry metadata.
    pub decorated: HashSet<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InjectHook;

impl InjectHook {
    pub fn new() -> Self {
        Self
    }
}

impl Hook for InjectHook {
    fn id(&self) -> HookId {
        HookId::Inject
    }

    fn requires_signatures(&self) -> bool {
        true
    }

    fn handle(&self, ctx: &mut GenerationContext) -> Result<(), PassError> {
        let targets: Vec<usize> = ctx
            .bindings
            .iter()
            .enumerate()
            .filter(|(_, b)| is_inject_binding(b, &ctx.provenance))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let cached = ctx
            .module_state
            .get::<InjectState>(HookId::Inject)
            .is_some_and(|state| state.defaults.is_some());
        if !cached {
            let defaults = build_defaults(ctx, &targets)?;
            ctx.module_state
                .get_or_insert_with(HookId::Inject, InjectState::default)
                .defaults = Some(defaults);
        }

        let state = ctx
            .module_state
            .get_or_insert_with(HookId::Inject, InjectState::default);
        let alias = state.alias.get_or_insert_with(fresh_alias).clone();
        let mut added_any = false;

        for &index in &targets {
            let binding = &mut ctx.bindings[index];
            if state.decorated.contains(&binding.var_name) {
                continue;
            }
            let merged = state
                .defaults
                .as_ref()
                .and_then(|map| map.get(&binding_key(binding)))
                .map(Vec::as_slice)
                .unwrap_or_default();

            let args: Vec<String> = merged
                .iter()
                .filter(|(_, pd)| is_depends_default(&pd.default_expr))
                .map(|(index, pd)| {
                    format!(
                        "{}::InjectArgMeta<{}, {}>([]() {{ return {}; }})",
                        alias, index, pd.param_type, pd.default_expr
                    )
                })
                .collect();
            if args.is_empty() {
                continue;
            }

            tracing::info!(function = %binding.target, args = args.len(), "inject: bind-meta");
            binding.extra_args.extend(args);
            state.decorated.insert(binding.var_name.clone());
            added_any = true;
        }

        if added_any && !state.alias_emitted {
            ctx.prefix_lines
                .push(format!("namespace {} = {};", alias, METADATA_NAMESPACE));
            state.alias_emitted = true;
        }
        Ok(())
    }
}

// ============================================================================
// VALIDATION AND MERGE
// ============================================================================

/// Validates every injection target and returns its merged defaults.
fn build_defaults(
    ctx: &GenerationContext,
    targets: &[usize],
) -> Result<HashMap<BindingKey, Vec<(usize, ParamDefault)>>, PassError> {
    let bindings: Vec<&Binding> = targets.iter().map(|&i| &ctx.bindings[i]).collect();
    let unique = reject_duplicates(ctx, &bindings)?;

    let groups = records_by_fullname(&ctx.functions);
    let mut out = HashMap::new();

    for binding in unique {
        let Some(group) = groups.get(binding.target.as_str()) else {
            return Err(unresolvable(ctx, binding));
        };

        let mut selected = select_by_signature(group, binding);
        if selected.is_empty() && binding.target_signature.is_none() {
            selected = group.clone();
        }
        if selected.is_empty() {
            return Err(unresolvable(ctx, binding));
        }

        validate_overload_set(ctx, binding, &selected)?;

        if let Some(record) = selected.iter().find(|r| !r.kind.is_supported()) {
            let kind = ErrorKind::UnsupportedNodeKind {
                target: binding.target.clone(),
                kind: record.kind.to_string(),
            };
            return Err(ctx.report_at(PHASE, kind, binding));
        }

        let merged = merge_defaults(&selected);
        if !merged.is_empty() {
            out.insert(binding_key(binding), merged);
        }
    }
    Ok(out)
}

/// Fails on two injection markers for one target signature; otherwise returns
/// the first binding of each key in source order.
fn reject_duplicates<'b>(
    ctx: &GenerationContext,
    bindings: &[&'b Binding],
) -> Result<Vec<&'b Binding>, PassError> {
    let mut first_seen: Vec<(BindingKey, &'b Binding)> = Vec::new();
    let mut counts: HashMap<BindingKey, usize> = HashMap::new();
    let mut first_repeat: Option<&Binding> = None;

    for &binding in bindings {
        let key = binding_key(binding);
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            first_seen.push((key, binding));
        } else if first_repeat.is_none() {
            first_repeat = Some(binding);
        }
    }

    let Some(repeat) = first_repeat else {
        return Ok(first_seen.into_iter().map(|(_, b)| b).collect());
    };

    let duplicates: Vec<&Binding> = first_seen
        .iter()
        .filter(|(key, _)| counts[key] > 1)
        .map(|(_, b)| *b)
        .collect();
    let samples = duplicates
        .iter()
        .take(MAX_DUPLICATE_SAMPLES)
        .map(|b| display_signature(b))
        .collect();
    let kind = ErrorKind::DuplicateMarker {
        samples,
        remaining: duplicates.len().saturating_sub(MAX_DUPLICATE_SAMPLES),
    };
    Err(ctx
        .report_at(PHASE, kind, repeat)
        .with_help("keep a single decorator(@inject) per function signature"))
}

fn unresolvable(ctx: &GenerationContext, binding: &Binding) -> PassError {
    let kind = ErrorKind::UnresolvableSignature {
        target: binding.target.clone(),
        signature: binding.target_signature.clone().unwrap_or_default(),
    };
    ctx.report_at(PHASE, kind, binding)
}

/// Every selected record must agree on arity, parameter types and defaults.
fn validate_overload_set(
    ctx: &GenerationContext,
    binding: &Binding,
    records: &[&FunctionRecord],
) -> Result<(), PassError> {
    let ambiguous = |detail: &str| {
        let kind = ErrorKind::AmbiguousOverload {
            target: binding.target.clone(),
            detail: detail.to_string(),
        };
        ctx.report_at(PHASE, kind, binding)
            .with_help("use a unique function name or signature for injection targets")
    };

    let counts: HashSet<Option<usize>> = records.iter().map(|r| r.param_count()).collect();
    if counts.len() > 1 {
        return Err(ambiguous("different parameter counts"));
    }
    let types: HashSet<Vec<String>> = records
        .iter()
        .map(|r| r.signature.as_ref().map(|s| s.normalized_types()).unwrap_or_default())
        .collect();
    if types.len() > 1 {
        return Err(ambiguous("different parameter types"));
    }

    let mut seen: HashMap<usize, (String, String)> = HashMap::new();
    for record in records {
        let Some(signature) = &record.signature else {
            continue;
        };
        for (&index, pd) in &signature.defaults {
            let normalized = (normalize_ws(&pd.param_type), normalize_ws(&pd.default_expr));
            match seen.get(&index) {
                None => {
                    seen.insert(index, normalized);
                }
                Some(previous) if *previous != normalized => {
                    let kind = ErrorKind::ConflictingDefaults {
                        target: binding.target.clone(),
                        index,
                    };
                    return Err(ctx
                        .report_at(PHASE, kind, binding)
                        .with_help("repeat the default identically or give it in one declaration only"));
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// First record in source order wins for each parameter index.
fn merge_defaults(records: &[&FunctionRecord]) -> Vec<(usize, ParamDefault)> {
    let mut merged: BTreeMap<usize, ParamDefault> = BTreeMap::new();
    for signature in records.iter().filter_map(|r| r.signature.as_ref()) {
        for (&index, pd) in &signature.defaults {
            merged.entry(index).or_insert_with(|| pd.clone());
        }
    }
    merged.into_iter().collect()
}
