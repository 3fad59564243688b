//! End-to-end expansion through the library API with the tree-sitter source.

use decorator_pass::{ErrorKind, Expansion, PassConfig, PassError, Pipeline, TreeSitterSource};

const SECTION: &str = "\n\n\n// Generated decorator bindings.\n";

fn expand(text: &str, modules: &[&str]) -> Result<Expansion, PassError> {
    let config = PassConfig::default().with_modules(modules.iter().copied());
    let pipeline = Pipeline::new(config)?;
    pipeline.expand(text, "input.cpp", &mut TreeSitterSource::new())
}

fn alias_of(output: &str) -> String {
    output
        .lines()
        .find_map(|line| {
            line.strip_prefix("namespace ")
                .and_then(|rest| rest.strip_suffix(" = ::cpp::blackmagic::depends;"))
        })
        .expect("alias line present")
        .to_string()
}

#[test]
fn inject_with_depends_default() {
    let text = "decorator(@inject)\nvoid f(int x = Depends(make_x)) {}\n";
    let expansion = expand(text, &["inject"]).unwrap();
    let alias = alias_of(&expansion.output);

    let expected = format!(
        "{masked}{SECTION}namespace {alias} = ::cpp::blackmagic::depends;\n\n\
         inline auto __cppbm_dec_f_0_0 = (inject).Bind<&f>(\n    \
         {alias}::InjectArgMeta<0, int>([]() {{ return Depends(make_x); }})\n);\n",
        masked = format!("{}\nvoid f(int x = Depends(make_x)) {{}}\n", " ".repeat(18)),
    );
    assert_eq!(expansion.output, expected);
    assert_eq!(expansion.context.bindings.len(), 1);
    assert_eq!(expansion.context.prefix_lines.len(), 1);
}

#[test]
fn text_without_markers_is_unchanged() {
    let text = "// decorator(@inject) only in a comment\nint main() { return 0; }\n";
    let expansion = expand(text, &["inject", "invoker"]).unwrap();
    assert_eq!(expansion.output, text);
}

#[test]
fn original_region_keeps_layout() {
    let text = "namespace app {\ndecorator(@Route(\"/health\"),\n          @Logged())\nint Health() { return 200; }\n}\n";
    let expansion = expand(text, &[]).unwrap();
    let original = &expansion.output[..text.len()];
    assert_eq!(original.len(), text.len());
    assert_eq!(original.lines().count(), text.lines().count());
    assert!(!original.contains("decorator"));
    assert!(expansion.output[text.len()..].starts_with(SECTION));
}

#[test]
fn several_arguments_bind_the_same_function() {
    let text = "namespace app {\ndecorator(@Route(\"/health\"), @Logged())\nint Health() { return 200; }\n}\n";
    let expansion = expand(text, &[]).unwrap();
    let statements: Vec<&str> = expansion
        .context
        .bindings
        .iter()
        .map(|b| b.statement.as_str())
        .collect();
    assert_eq!(
        statements,
        vec![
            "inline auto __cppbm_dec_Health_16_0 = (Route(\"/health\")).Bind<&app::Health>();",
            "inline auto __cppbm_dec_Health_16_1 = (Logged()).Bind<&app::Health>();",
        ]
    );
}

#[test]
fn marker_binds_the_nearest_following_function() {
    let text = "void before() {}\ndecorator(@A())\nvoid first() {}\nvoid second() {}\n";
    let expansion = expand(text, &[]).unwrap();
    assert_eq!(expansion.context.bindings[0].target, "first");
}

#[test]
fn out_of_line_member_definition() {
    let text = "namespace ns {\nstruct Outer { void method(); };\ndecorator(@Route(\"/m\"))\nvoid Outer::method() {}\n}\n";
    let expansion = expand(text, &["invoker"]).unwrap();
    let binding = &expansion.context.bindings[0];
    assert_eq!(binding.target, "ns::Outer::method");
    assert!(binding.extra_args.is_empty());
}

#[test]
fn invoker_for_nullary_free_function() {
    let text = "namespace app {\ndecorator(@Route(\"/health\"))\nint Health() { return 200; }\n}\n";
    let expansion = expand(text, &["invoker"]).unwrap();
    assert!(expansion
        .output
        .contains("(Route(\"/health\")).Bind<&app::Health>(\n    []() { return ::app::Health(); }\n);"));
}

#[test]
fn hooks_run_in_configured_order() {
    let text = "decorator(@inject)\nint make(int n = Depends(seed)) { return n; }\n";
    let expansion = expand(text, &["inject", "invoker"]).unwrap();
    let args = &expansion.context.bindings[0].extra_args;
    assert_eq!(args.len(), 2);
    assert!(args[0].contains("::InjectArgMeta<0, int>"));
    assert_eq!(args[1], "[]() { return ::make(); }");
}

#[test]
fn forward_declaration_default_wins() {
    let text = "int g(int x = Depends( seed ));\ndecorator(@inject)\nint g(int x = Depends(seed)) { return x; }\n";
    let expansion = expand(text, &["inject"]).unwrap();
    assert!(expansion.context.bindings[0].extra_args[0].contains("return Depends( seed );"));
}

#[test]
fn conflicting_defaults_fail_the_run() {
    let text = "int g(int x = Depends(a));\ndecorator(@inject)\nint g(int x = Depends(b)) { return x; }\n";
    let err = expand(text, &["inject"]).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::ConflictingDefaults {
            target: "g".into(),
            index: 0
        }
    );
}

#[test]
fn duplicate_inject_names_the_signature() {
    let text = "decorator(@inject)\nvoid f(int x);\ndecorator(@inject)\nvoid f(int x) {}\n";
    let err = expand(text, &["inject"]).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::DuplicateMarker {
            samples: vec!["f(int)".into()],
            remaining: 0
        }
    );
}

#[test]
fn overloads_without_inject_are_not_validated() {
    let text = "void h(int a = Depends(x));\nvoid h(double a = 1.0);\ndecorator(@Route(\"/h\"))\nvoid h(int a) {}\n";
    let expansion = expand(text, &["inject"]).unwrap();
    assert!(expansion.context.prefix_lines.is_empty());
    assert!(expansion.context.bindings[0].extra_args.is_empty());
}

#[test]
fn unmatched_parenthesis_is_malformed() {
    let err = expand("decorator(@inject\nvoid f() {}\n", &[]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MalformedMarker { .. }));
    assert_eq!(err.diagnostic_info.error_code, "decorator::scan::malformed_marker");
}

#[test]
fn unknown_module_fails_before_scanning() {
    let err = expand("decorator(@x\n", &["nope"]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ModuleLoad { .. }));
}

#[test]
fn bindings_are_emitted_in_the_target_namespace() {
    let text = "namespace cppbm::examples::decorator {\n\
                inline constexpr App app{};\n\
                decorator(@app.get(\"/health\"))\n\
                int HealthStatus() { return 200; }\n\
                }\n";
    let expansion = expand(text, &["invoker"]).unwrap();
    let start = text.find("decorator(").unwrap();

    let generated = &expansion.output[text.len()..];
    let expected = format!(
        "{SECTION}namespace cppbm::examples::decorator {{\n\
         inline auto __cppbm_dec_HealthStatus_{start}_0 = (app.get(\"/health\")).Bind<&cppbm::examples::decorator::HealthStatus>(\n    \
         []() {{ return ::cppbm::examples::decorator::HealthStatus(); }}\n\
         );\n\
         }}\n"
    );
    assert_eq!(generated, expected);
    assert_eq!(expansion.context.bindings[0].namespace_scope, "cppbm::examples::decorator");
}

#[test]
fn global_and_namespaced_bindings_keep_source_order() {
    let text = "decorator(@A())\nvoid top() {}\nnamespace app {\ndecorator(@B())\nvoid inner() {}\n}\n";
    let expansion = expand(text, &[]).unwrap();
    let generated = &expansion.output[text.len()..];
    assert!(generated.ends_with(
        "(A()).Bind<&top>();\nnamespace app {\ninline auto __cppbm_dec_inner_46_1 = (B()).Bind<&app::inner>();\n}\n"
    ));
}

#[test]
fn out_of_line_member_of_unseen_class_gets_no_invoker() {
    let text = "namespace ns {\ndecorator(@Route(\"/get\"))\nint Counter::Get() { return value_; }\n}\n";
    let expansion = expand(text, &["invoker"]).unwrap();
    let binding = &expansion.context.bindings[0];
    assert_eq!(binding.target, "ns::Counter::Get");
    assert!(binding.extra_args.is_empty());
    assert!(!expansion.output.contains("[]()"));
}
