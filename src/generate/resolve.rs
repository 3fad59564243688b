//! Masking, marker-to-function binding and output assembly.

use crate::extract::FunctionRecord;
use crate::generate::context::{Binding, GenerationContext};
use crate::scanner::MarkerHit;

/// Blanks every byte range with spaces, keeping newlines and byte length.
///
/// A character straddling a range boundary is blanked whole, so the result
/// is always valid UTF-8 of exactly the original byte length.
pub fn mask_ranges_keep_layout(text: &str, ranges: &[(usize, usize)]) -> String {
    let mut covered = vec![false; text.len()];
    for &(start, end) in ranges {
        let end = end.min(text.len());
        if start < end {
            covered[start..end].fill(true);
        }
    }

    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        let width = c.len_utf8();
        if c != '\n' && covered[i..i + width].iter().any(|&m| m) {
            out.extend(std::iter::repeat(' ').take(width));
        } else {
            out.push(c);
        }
    }
    out
}

/// The record starting closest after `marker_end`, strictly after it.
pub fn find_nearest_function(functions: &[FunctionRecord], marker_end: usize) -> Option<&FunctionRecord> {
    functions
        .iter()
        .filter(|f| f.start > marker_end)
        .min_by_key(|f| f.start - marker_end)
}

/// `__cppbm_dec_<short>_<marker start>_<ordinal>`.
pub fn binding_var_name(short_name: &str, marker_start: usize, ordinal: usize) -> String {
    let short: String = short_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("__cppbm_dec_{}_{}_{}", short, marker_start, ordinal)
}

pub fn render_statement(var_name: &str, expr: &str, target: &str) -> String {
    format!("inline auto {} = ({}).Bind<&{}>();", var_name, expr, target)
}

/// Builds the binding for the `ordinal`-th marker and the record it binds to.
pub fn bind_marker(marker: &MarkerHit, ordinal: usize, function: &FunctionRecord) -> Binding {
    let var_name = binding_var_name(&function.name, marker.start, ordinal);
    let statement = render_statement(&var_name, &marker.expression, &function.fullname);
    Binding {
        var_name,
        expr: marker.expression.clone(),
        provenance: marker.provenance.clone(),
        target: function.fullname.clone(),
        target_signature: function.signature.as_ref().map(|s| s.param_types.clone()),
        namespace_scope: function.namespace.join("::"),
        marker_start: marker.start,
        marker_end: marker.end,
        statement,
        extra_args: Vec::new(),
    }
}

/// Moves extra arguments into the `()` that ends a statement.
///
/// Returns `None` when the statement no longer ends in `();`.
pub fn splice_extra_args(statement: &str, extra_args: &[String]) -> Option<String> {
    if extra_args.is_empty() {
        return Some(statement.to_string());
    }
    let head = statement.trim_end().strip_suffix("();")?;
    let args: Vec<String> = extra_args.iter().map(|arg| format!("    {}", arg)).collect();
    Some(format!("{}(\n{}\n);", head, args.join(",\n")))
}

/// Consecutive bindings sharing a namespace, in binding order.
fn namespace_runs(bindings: &[Binding]) -> Vec<(&str, &[Binding])> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=bindings.len() {
        if i == bindings.len() || bindings[i].namespace_scope != bindings[start].namespace_scope {
            runs.push((bindings[start].namespace_scope.as_str(), &bindings[start..i]));
            start = i;
        }
    }
    runs
}

fn final_statement(binding: &Binding) -> String {
    match splice_extra_args(&binding.statement, &binding.extra_args) {
        Some(statement) => statement,
        None => {
            tracing::warn!(
                var = %binding.var_name,
                dropped = binding.extra_args.len(),
                "statement was rewritten by a module; extra arguments not spliced"
            );
            binding.statement.clone()
        }
    }
}

/// Final text: masked source, then the generated section if there is one.
pub fn assemble_output(ctx: &GenerationContext, section_marker: &str) -> String {
    let mut out = ctx.masked_text.clone();
    if !ctx.has_generated_content() {
        return out;
    }

    out.push_str("\n\n\n");
    out.push_str(section_marker);
    out.push('\n');

    for line in &ctx.prefix_lines {
        out.push_str(line);
        out.push('\n');
    }
    if !ctx.prefix_lines.is_empty() && !ctx.bindings.is_empty() {
        out.push('\n');
    }

    for (scope, run) in namespace_runs(&ctx.bindings) {
        if !scope.is_empty() {
            out.push_str(&format!("namespace {} {{\n", scope));
        }
        for binding in run {
            out.push_str(&final_statement(binding));
            out.push('\n');
        }
        if !scope.is_empty() {
            out.push_str("}\n");
        }
    }

    if !ctx.suffix_lines.is_empty() && !ctx.bindings.is_empty() {
        out.push('\n');
    }
    for line in &ctx.suffix_lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::NodeKind;
    use crate::generate::context::ModuleStates;

    fn record(name: &str, start: usize) -> FunctionRecord {
        FunctionRecord {
            name: name.to_string(),
            fullname: format!("ns::{}", name),
            start,
            end: start + 10,
            kind: NodeKind::FunctionDefinition,
            namespace: vec!["ns".to_string()],
            signature: None,
        }
    }

    #[test]
    fn mask_preserves_length_and_newlines() {
        let text = "a decorator(@x,\n @y) b\r\nc";
        let start = text.find("decorator").unwrap();
        let end = text.find(") b").unwrap() + 1;
        let masked = mask_ranges_keep_layout(text, &[(start, end)]);
        assert_eq!(masked.len(), text.len());
        let newlines = |s: &str| s.match_indices('\n').map(|(i, _)| i).collect::<Vec<_>>();
        assert_eq!(newlines(&masked), newlines(text));
        assert!(masked.starts_with("a "));
        assert!(!masked.contains("decorator"));
        assert!(masked.ends_with(" b\r\nc"));
    }

    #[test]
    fn mask_blanks_multibyte_characters_whole() {
        let text = "x(\"ü\")y";
        let masked = mask_ranges_keep_layout(text, &[(1, text.len() - 1)]);
        assert_eq!(masked, format!("x{}y", " ".repeat(text.len() - 2)));

        let inside = text.find('ü').unwrap() + 1;
        let partial = mask_ranges_keep_layout(text, &[(inside, inside + 1)]);
        assert_eq!(partial, "x(\"  \")y");
    }

    #[test]
    fn nearest_is_strictly_after_marker() {
        let functions = vec![record("before", 5), record("far", 80), record("near", 40)];
        assert_eq!(find_nearest_function(&functions, 20).unwrap().name, "near");
        assert_eq!(find_nearest_function(&functions, 40).unwrap().name, "far");
        assert!(find_nearest_function(&functions, 80).is_none());
    }

    #[test]
    fn var_names_are_sanitized_and_unique_per_ordinal() {
        assert_eq!(binding_var_name("run", 12, 0), "__cppbm_dec_run_12_0");
        assert_eq!(binding_var_name("operator==", 3, 1), "__cppbm_dec_operator___3_1");
        assert_ne!(binding_var_name("f", 0, 0), binding_var_name("f", 0, 1));
    }

    #[test]
    fn splice_into_call_parentheses() {
        let statement = render_statement("v", "e", "t");
        assert_eq!(statement, "inline auto v = (e).Bind<&t>();");
        let spliced = splice_extra_args(&statement, &["a".into(), "b".into()]).unwrap();
        assert_eq!(spliced, "inline auto v = (e).Bind<&t>(\n    a,\n    b\n);");
        assert!(splice_extra_args("custom;", &["a".into()]).is_none());
    }

    fn scoped_binding(scope: &str, var: &str) -> Binding {
        Binding {
            var_name: var.into(),
            expr: "e".into(),
            provenance: "macro".into(),
            target: "t".into(),
            target_signature: None,
            namespace_scope: scope.into(),
            marker_start: 0,
            marker_end: 1,
            statement: render_statement(var, "e", "t"),
            extra_args: Vec::new(),
        }
    }

    #[test]
    fn statements_are_emitted_inside_their_namespace() {
        let ctx = GenerationContext {
            source_name: "a.cpp".into(),
            provenance: "macro".into(),
            text: String::new(),
            masked_text: "x\n".into(),
            markers: Vec::new(),
            functions: Vec::new(),
            bindings: vec![
                scoped_binding("a::b", "v0"),
                scoped_binding("a::b", "v1"),
                scoped_binding("", "v2"),
                scoped_binding("c", "v3"),
            ],
            prefix_lines: Vec::new(),
            suffix_lines: Vec::new(),
            module_state: ModuleStates::default(),
        };
        let expected = "x\n\n\n\n// M\n\
            namespace a::b {\n\
            inline auto v0 = (e).Bind<&t>();\n\
            inline auto v1 = (e).Bind<&t>();\n\
            }\n\
            inline auto v2 = (e).Bind<&t>();\n\
            namespace c {\n\
            inline auto v3 = (e).Bind<&t>();\n\
            }\n";
        assert_eq!(assemble_output(&ctx, "// M"), expected);
    }
}
