//! tree-sitter backed declaration source.

use std::collections::BTreeMap;

use tree_sitter::{Node, Parser, Tree};

use super::{
    extract_param_type, merge_scope_with_qualified, DeclarationSource, Fidelity, FunctionRecord,
    NodeKind, ParamDefault, Signature,
};
use crate::errors::{unspanned, ErrorKind, ErrorReporting, PassError, PhaseContext};

const PROBE_SOURCE: &[u8] = b"int __cppbm_probe__() { return 0; }";

/// Node kinds that terminate the declarator descent.
const NAME_KINDS: &[&str] = &[
    "identifier",
    "field_identifier",
    "qualified_identifier",
    "destructor_name",
    "operator_name",
];

/// A C++ parser that is known to work.
///
/// Construction binds the grammar and runs a probe parse, so a broken
/// grammar/runtime pairing is reported once, up front.
pub struct CppParser {
    parser: Parser,
}

impl CppParser {
    pub fn new() -> Result<Self, PassError> {
        let mut parser = Parser::new();
        parser
            .set_language(tree_sitter_cpp::language())
            .map_err(|e| parser_unavailable(&e.to_string()))?;
        if parser.parse(PROBE_SOURCE, None).is_none() {
            return Err(parser_unavailable("probe parse produced no tree"));
        }
        Ok(Self { parser })
    }

    pub fn parse(&mut self, code: &[u8]) -> Result<Tree, PassError> {
        self.parser.reset();
        self.parser
            .parse(code, None)
            .ok_or_else(|| parser_unavailable("parse was cancelled or timed out"))
    }
}

fn parser_unavailable(reason: &str) -> PassError {
    PhaseContext::detached("extract")
        .report(
            ErrorKind::ParserUnavailable {
                reason: reason.to_string(),
            },
            unspanned(),
        )
        .with_help("the tree-sitter C++ grammar could not be loaded; signature-dependent modules cannot run without it")
}

/// Full-fidelity source: names, scopes, parameter types and defaults.
///
/// The parser is built on first use and reused for every later extraction.
#[derive(Default)]
pub struct TreeSitterSource {
    parser: Option<CppParser>,
}

impl TreeSitterSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn parser(&mut self) -> Result<&mut CppParser, PassError> {
        let parser = match self.parser.take() {
            Some(parser) => parser,
            None => CppParser::new()?,
        };
        Ok(self.parser.insert(parser))
    }
}

impl DeclarationSource for TreeSitterSource {
    fn name(&self) -> &'static str {
        "tree-sitter"
    }

    fn fidelity(&self) -> Fidelity {
        Fidelity::Signatures
    }

    fn extract(&mut self, masked: &str) -> Result<Vec<FunctionRecord>, PassError> {
        let code = masked.as_bytes();
        let tree = self.parser()?.parse(code)?;

        let mut records = Vec::new();
        let mut cursor = tree.walk();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if let Some(kind) = NodeKind::from_tree_sitter(node.kind()) {
                if let Some(record) = function_record(node, kind, code) {
                    records.push(record);
                }
            }
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }

        tracing::debug!(records = records.len(), "extracted function-like nodes");
        Ok(records)
    }
}

// ============================================================================
// NODE WALKING
// ============================================================================

fn function_record(node: Node, kind: NodeKind, code: &[u8]) -> Option<FunctionRecord> {
    let declarator = node.child_by_field_name("declarator")?;
    let parameter_list = find_first_descendant(declarator, "parameter_list")?;

    let name_node = descend_to_name(declarator);
    let name_text = node_text(name_node, code);
    let name_text = name_text.trim();
    let name_text = name_text.strip_prefix("::").unwrap_or(name_text);
    if name_text.is_empty() {
        return None;
    }

    let EnclosingScope { scope, namespace } = enclosing_scope(node, code);
    let (name, fullname) = if name_text.contains("::") {
        let qualified = split_qualified(name_text);
        let name = qualified.last().cloned().unwrap_or_default();
        let merged = merge_scope_with_qualified(&scope, &qualified);
        (name, merged.join("::"))
    } else {
        let mut parts = scope;
        parts.push(name_text.to_string());
        (name_text.to_string(), parts.join("::"))
    };

    Some(FunctionRecord {
        name,
        fullname,
        start: node.start_byte(),
        end: node.end_byte(),
        kind,
        namespace,
        signature: Some(read_parameters(parameter_list, code)),
    })
}

/// Follows `declarator` fields (or the last child) through pointer,
/// reference and function declarator wrappers down to the name.
fn descend_to_name(declarator: Node) -> Node {
    let mut current = declarator;
    while !NAME_KINDS.contains(&current.kind()) {
        if let Some(inner) = current.child_by_field_name("declarator") {
            current = inner;
        } else if current.child_count() > 0 {
            match current.child(current.child_count() - 1) {
                Some(last) => current = last,
                None => break,
            }
        } else {
            break;
        }
    }
    current
}

/// Lexical scopes around a node, outermost first.
struct EnclosingScope {
    /// Namespaces and classes.
    scope: Vec<String>,
    /// Namespaces only.
    namespace: Vec<String>,
}

fn enclosing_scope(node: Node, code: &[u8]) -> EnclosingScope {
    let mut scope: Vec<String> = Vec::new();
    let mut namespace: Vec<String> = Vec::new();
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == "translation_unit" {
            break;
        }
        let is_namespace = parent.kind() == "namespace_definition";
        let is_scope = is_namespace
            || matches!(
                parent.kind(),
                "class_specifier" | "struct_specifier" | "union_specifier"
            );
        if is_scope {
            if let Some(name) = parent.child_by_field_name("name") {
                let mut parts = split_qualified(&node_text(name, code));
                parts.reverse();
                if is_namespace {
                    namespace.extend(parts.iter().cloned());
                }
                scope.extend(parts);
            }
        }
        current = parent.parent();
    }
    scope.reverse();
    namespace.reverse();
    EnclosingScope { scope, namespace }
}

fn read_parameters(parameter_list: Node, code: &[u8]) -> Signature {
    let mut signature = Signature::default();
    let mut defaults = BTreeMap::new();
    let mut cursor = parameter_list.walk();

    for child in parameter_list.children(&mut cursor) {
        let index = signature.param_types.len();
        match child.kind() {
            "optional_parameter_declaration" => {
                let whole = node_text(child, code);
                let mut eq_cursor = child.walk();
                let eq = child.children(&mut eq_cursor).find(|n| n.kind() == "=");

                let lhs = match eq {
                    Some(eq) => {
                        let lhs = byte_text(code, child.start_byte(), eq.start_byte());
                        let rhs = byte_text(code, eq.end_byte(), child.end_byte());
                        let param_type = extract_param_type(&lhs);
                        let default_expr = rhs.trim();
                        if !param_type.is_empty() && !default_expr.is_empty() {
                            defaults.insert(
                                index,
                                ParamDefault {
                                    param_type,
                                    default_expr: default_expr.to_string(),
                                },
                            );
                        }
                        lhs
                    }
                    None => String::new(),
                };

                let declared = if lhs.trim().is_empty() { whole } else { lhs };
                signature.param_types.push(extract_param_type(&declared));
            }
            "parameter_declaration" | "variadic_parameter_declaration" => {
                signature
                    .param_types
                    .push(extract_param_type(&node_text(child, code)));
            }
            "variadic_parameter" | "..." => signature.param_types.push("...".to_string()),
            _ => {}
        }
    }

    signature.defaults = defaults;
    signature
}

fn find_first_descendant<'t>(node: Node<'t>, wanted: &str) -> Option<Node<'t>> {
    if node.kind() == wanted {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| find_first_descendant(child, wanted))
}

fn split_qualified(text: &str) -> Vec<String> {
    text.split("::")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn node_text(node: Node, code: &[u8]) -> String {
    byte_text(code, node.start_byte(), node.end_byte())
}

fn byte_text(code: &[u8], start: usize, end: usize) -> String {
    String::from_utf8_lossy(&code[start..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(code: &str) -> Vec<FunctionRecord> {
        TreeSitterSource::new().extract(code).expect("parser should work")
    }

    fn find<'a>(records: &'a [FunctionRecord], fullname: &str) -> &'a FunctionRecord {
        records
            .iter()
            .find(|r| r.fullname == fullname)
            .unwrap_or_else(|| panic!("no record named {fullname} in {records:#?}"))
    }

    #[test]
    fn namespaced_definition() {
        let records = extract("namespace app { int Health() { return 200; } }");
        let rec = find(&records, "app::Health");
        assert_eq!(rec.name, "Health");
        assert_eq!(rec.kind, NodeKind::FunctionDefinition);
        assert_eq!(rec.param_count(), Some(0));
    }

    #[test]
    fn out_of_line_member_merges_scope() {
        let code = "namespace ns { struct Outer { void method(int a); }; void Outer::method(int a) {} }";
        let records = extract(code);
        let decls: Vec<_> = records
            .iter()
            .filter(|r| r.fullname == "ns::Outer::method")
            .collect();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].kind, NodeKind::FieldDeclaration);
        assert_eq!(decls[1].kind, NodeKind::FunctionDefinition);
        assert!(decls.iter().all(|r| r.namespace == vec!["ns".to_string()]));
        assert!(records.iter().all(|r| !r.fullname.contains("Outer::Outer")));
    }

    #[test]
    fn nested_namespace_chain_excludes_classes() {
        let code = "namespace a::b { namespace c { struct S { void m(); }; int f(); } }";
        let records = extract(code);
        let chain = |r: &FunctionRecord| r.namespace.join("::");
        assert_eq!(chain(find(&records, "a::b::c::f")), "a::b::c");
        assert_eq!(chain(find(&records, "a::b::c::S::m")), "a::b::c");
    }

    #[test]
    fn leading_global_qualifier_is_dropped() {
        let records = extract("void ::g() {}");
        assert!(records.iter().any(|r| r.fullname == "g"));
    }

    #[test]
    fn defaults_and_types() {
        let code = "std::string ReadEnv(Config& cfg = Depends(DefaultConfigFactory), int n = 3, double d);";
        let records = extract(code);
        let rec = find(&records, "ReadEnv");
        let sig = rec.signature.as_ref().unwrap();
        assert_eq!(sig.param_types, vec!["Config&", "int", "double"]);
        assert_eq!(sig.defaults.len(), 2);
        assert_eq!(sig.defaults[&0].param_type, "Config&");
        assert_eq!(sig.defaults[&0].default_expr, "Depends(DefaultConfigFactory)");
        assert_eq!(sig.defaults[&1].default_expr, "3");
    }

    #[test]
    fn variadic_parameter() {
        let records = extract("int log(const char* fmt, ...);");
        let sig = find(&records, "log").signature.clone().unwrap();
        assert_eq!(sig.param_types.last().map(String::as_str), Some("..."));
        assert_eq!(sig.param_count(), 2);
    }

    #[test]
    fn reference_return_type() {
        let records = extract("Config& DefaultConfigFactory() { static Config c; return c; }");
        find(&records, "DefaultConfigFactory");
    }

    #[test]
    fn plain_variables_are_not_functions() {
        let records = extract("int x = 5; int y = compute(1, 2);");
        assert!(records.is_empty());
    }

    #[test]
    fn records_are_in_source_order() {
        let records = extract("void a(); void b() {} void c();");
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(records.windows(2).all(|w| w[0].start < w[1].start));
    }
}
