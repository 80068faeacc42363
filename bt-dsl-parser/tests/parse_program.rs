use bt_dsl_ast::debug_dump::dump_program;
use bt_dsl_ast::{AstArena, Decl, Stmt};
use bt_dsl_parser::parse_source;

fn parse(src: &str) -> (String, usize) {
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    (dump_program(program), diags.error_count())
}

#[test]
fn empty_tree() {
    let (dump, errors) = parse("tree Main() { }");
    assert_eq!(errors, 0);
    assert_eq!(dump, "tree Main\n");
}

#[test]
fn leaf_call_with_named_args() {
    let (dump, errors) = parse(r#"tree Main() { DoWork(speed: 3, label: "go"); }"#);
    assert_eq!(errors, 0);
    assert!(dump.contains("call DoWork"));
}

#[test]
fn compound_call_with_children_and_precondition() {
    let src = r#"
        tree Main() {
            @guard(ready) Sequence {
                A();
                B();
            }
        }
    "#;
    let (dump, errors) = parse(src);
    assert_eq!(errors, 0);
    assert!(dump.contains("call Sequence"));
    assert!(dump.contains("call A"));
    assert!(dump.contains("call B"));
}

#[test]
fn out_var_inline_decl_and_ref_arg() {
    let (dump, errors) = parse("tree Main() { DoWork(result: out var x, state: ref y); }");
    assert_eq!(errors, 0);
    assert!(dump.contains("call DoWork"));
}

#[test]
fn extern_control_with_behavior_attribute() {
    let src = r#"
        #[behavior(All, Chained)]
        extern control Sequence();
    "#;
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 0);
    let Decl::ExternNode(decl) = program.items[0] else {
        panic!("expected extern node decl");
    };
    assert_eq!(decl.name, "Sequence");
    let behavior = decl.behavior.expect("behavior attribute should be set");
    assert_eq!(behavior.data_policy, bt_dsl_ast::DataPolicy::All);
    assert_eq!(behavior.flow_policy, bt_dsl_ast::FlowPolicy::Chained);
}

#[test]
fn global_const_and_var_roundtrip_through_dump() {
    let (dump, errors) = parse("const Speed: int32 = 3; var Position: float64 = 0.0;");
    assert_eq!(errors, 0);
    assert!(dump.contains("global_const Speed"));
    assert!(dump.contains("global_var Position"));
}

#[test]
fn assignment_and_local_decls() {
    let src = r#"
        tree Main() {
            var x: int32 = 0;
            const y = 2;
            x += y;
        }
    "#;
    let (dump, errors) = parse(src);
    assert_eq!(errors, 0);
    assert!(dump.contains("var x"));
    assert!(dump.contains("const y"));
    assert!(dump.contains("assign AddAssign"));
}

#[test]
fn static_and_dynamic_array_types_and_nullable() {
    let src = r#"
        extern type Foo;
        var Items: [int32; 4];
        var Bounded: [int32; <=8];
        var Dyn: vec<Foo>;
        var Maybe: int32?;
    "#;
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 0);
    assert_eq!(program.items.len(), 5);
}

#[test]
fn bounded_string_type() {
    let src = "var Name: string<64>;";
    let arena = AstArena::new();
    let (_program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 0);
}

#[test]
fn expression_precedence_for_mixed_operators() {
    let src = "const V = 1 + 2 * 3 == 7 && true;";
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 0);
    let Decl::GlobalConst(decl) = program.items[0] else {
        panic!("expected global const decl");
    };
    match decl.init {
        bt_dsl_ast::Expr::Binary(b) => assert_eq!(b.op, bt_dsl_ast::BinaryOp::And),
        other => panic!("expected top-level '&&', got {other:?}"),
    }
}

#[test]
fn vec_macro_and_array_repeat() {
    let src = "const A = vec![1, 2, 3]; const B = [0; 4];";
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 0);
    assert_eq!(program.items.len(), 2);
}

#[test]
fn import_relative_and_package() {
    let src = r#"
        import "./util.bt";
        import "some/pkg";
    "#;
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 0);
    assert_eq!(program.imports.len(), 2);
}

#[test]
fn import_absolute_path_is_a_parse_time_diagnostic() {
    let src = r#"import "/abs/path.bt";"#;
    let arena = AstArena::new();
    let (_program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 1);
}

#[test]
fn ref_mut_out_port_with_default_is_rejected() {
    let src = "extern action DoWork(ref x: int32 = 1);";
    let arena = AstArena::new();
    let (_program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 1);
}

#[test]
fn doc_comments_attach_to_following_tree_and_are_skipped_by_parser() {
    let src = r#"
        //! module-level summary
        /// picks the next target
        tree Main() { }
    "#;
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    assert_eq!(diags.error_count(), 0);
    assert_eq!(program.inner_docs, vec!["module-level summary".to_string()]);
    let Decl::Tree(tree) = program.items[0] else {
        panic!("expected tree decl");
    };
    assert_eq!(tree.docs, vec!["picks the next target".to_string()]);
}

#[test]
fn malformed_statement_recovers_and_keeps_parsing() {
    let src = r#"
        tree Main() {
            var ;
            A();
        }
    "#;
    let arena = AstArena::new();
    let (program, diags) = parse_source(src, &arena);
    assert!(diags.error_count() > 0);
    let Decl::Tree(tree) = program.items[0] else {
        panic!("expected tree decl");
    };
    let has_call_a = tree.body.iter().any(|s| matches!(s, Stmt::NodeCall(c) if c.name == "A"));
    assert!(has_call_a, "parser should recover and still see the call to A()");
}
